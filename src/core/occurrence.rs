use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifies one calendar-date instance of a recurring task. Membership in
/// the store's completion set is the sole record that an occurrence was
/// completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OccurrenceKey {
    pub task_id: Uuid,
    pub date: NaiveDate,
}

impl OccurrenceKey {
    pub fn new(task_id: Uuid, date: NaiveDate) -> Self {
        Self { task_id, date }
    }
}

/// Composite string form used in persisted JSON: `<uuid>-<YYYY-MM-DD>`.
impl fmt::Display for OccurrenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.task_id, self.date)
    }
}

impl FromStr for OccurrenceKey {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The date is the fixed-width tail; everything before the joining
        // hyphen is the id. Well-formed keys are pure ASCII.
        if s.len() < 12 || !s.is_ascii() {
            return Err(());
        }
        let (head, date_part) = s.split_at(s.len() - 10);
        let id_part = head.strip_suffix('-').ok_or(())?;
        let task_id = Uuid::parse_str(id_part).map_err(|_| ())?;
        let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| ())?;
        Ok(Self { task_id, date })
    }
}

/// Serde adapter persisting a `BTreeSet<OccurrenceKey>` as the flat
/// `{"<id>-<date>": true}` object of the reference format. Entries that fail
/// to parse on load are dropped with a warning; `false` values never occur
/// in well-formed state but are dropped too rather than kept as stale
/// markers.
pub mod flat_map {
    use super::OccurrenceKey;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::{BTreeMap, BTreeSet};

    pub fn serialize<S>(set: &BTreeSet<OccurrenceKey>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(set.iter().map(|key| (key.to_string(), true)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeSet<OccurrenceKey>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: BTreeMap<String, bool> = BTreeMap::deserialize(deserializer)?;
        let mut set = BTreeSet::new();
        for (key, value) in raw {
            if !value {
                continue;
            }
            match key.parse::<OccurrenceKey>() {
                Ok(parsed) => {
                    set.insert(parsed);
                }
                Err(()) => log::warn!("Dropping unparseable completion key: {}", key),
            }
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeSet;

    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "flat_map")]
        completions: BTreeSet<OccurrenceKey>,
    }

    fn key(id: &str, date: &str) -> OccurrenceKey {
        OccurrenceKey::new(
            Uuid::parse_str(id).unwrap(),
            NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        )
    }

    const ID: &str = "67e55044-10b1-426f-9247-bb680e5fe0c8";

    #[test]
    fn display_parse_roundtrip() {
        let original = key(ID, "2024-03-09");
        let text = original.to_string();
        assert_eq!(text, format!("{}-2024-03-09", ID));
        assert_eq!(text.parse::<OccurrenceKey>().unwrap(), original);
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!("not-a-key".parse::<OccurrenceKey>().is_err());
        assert!(format!("{}2024-03-09", ID).parse::<OccurrenceKey>().is_err());
        assert!(format!("{}-2024-13-09", ID).parse::<OccurrenceKey>().is_err());
    }

    #[test]
    fn flat_map_roundtrip() {
        let mut completions = BTreeSet::new();
        completions.insert(key(ID, "2024-01-01"));
        completions.insert(key(ID, "2024-01-03"));
        let json = serde_json::to_string(&Wrapper {
            completions: completions.clone(),
        })
        .unwrap();
        assert!(json.contains(&format!(r#""{}-2024-01-01":true"#, ID)));
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.completions, completions);
    }

    #[test]
    fn load_drops_bad_and_false_entries() {
        let json = format!(
            r#"{{"completions":{{"{id}-2024-01-01":true,"garbage":true,"{id}-2024-01-02":false}}}}"#,
            id = ID
        );
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.completions.len(), 1);
        assert!(back.completions.contains(&key(ID, "2024-01-01")));
    }
}
