use serde_json::Value;

use crate::diff::diff_json;
use crate::paths::{Field, PathTable, StatusPath, MODE_PLACEHOLDER};
use crate::types::{Change, Mode, Zone};
use crate::{Error, Result};

/// One parsed status frame: `[system, {<mode key>: {...}}]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    raw: Value,
    mode: Mode,
}

impl Status {
    pub fn parse(body: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(body)?;
        Self::from_value(raw)
    }

    pub fn from_value(raw: Value) -> Result<Self> {
        let slots = raw
            .as_array()
            .ok_or_else(|| Error::Protocol("status body is not an array".into()))?;
        if slots.len() < 2 || !slots[0].is_object() {
            return Err(Error::Protocol("status body needs system and mode objects".into()));
        }
        let mode_obj = slots[1]
            .as_object()
            .ok_or_else(|| Error::Protocol("mode slot is not an object".into()))?;
        let mut keys = mode_obj.keys();
        let mode = match (keys.next(), keys.next()) {
            (Some(key), None) => Mode::from_key(key)
                .ok_or_else(|| Error::Protocol(format!("unknown mode key: {key}")))?,
            _ => {
                return Err(Error::Protocol(format!(
                    "mode slot must have exactly one key, found {}",
                    mode_obj.len()
                )));
            }
        };
        Ok(Self { raw, mode })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    /// Value at `path`, or `None` if any segment is absent.
    pub fn get(&self, path: &StatusPath) -> Option<&Value> {
        let path = path.with_mode(self.mode);
        self.raw
            .get(path.slot())?
            .get(&path.group)?
            .get(&path.section)?
            .get(&path.command)
    }

    pub fn get_str(&self, path: &StatusPath) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Look up a dotted path such as `SYST.CFG.TU` or `{mode}.OOP.ST`.
    pub fn lookup(&self, path: &str) -> Result<Option<&Value>> {
        let path: StatusPath = path.parse()?;
        Ok(self.get(&path))
    }

    /// Read a semantic field through the path table.
    pub fn field(&self, table: &PathTable, field: Field, zone: Option<Zone>) -> Option<&str> {
        let path = table.resolve(field, self.mode, zone)?;
        self.get_str(&path)
    }

    /// True when `path` holds `expected`, comparing numbers by their text form.
    pub fn matches(&self, path: &StatusPath, expected: &str) -> bool {
        match self.get(path) {
            Some(Value::String(s)) => s == expected,
            Some(Value::Number(n)) => n.to_string() == expected,
            Some(Value::Bool(b)) => b.to_string() == expected,
            _ => false,
        }
    }

    /// Zones marked installed for the active mode. Never empty: the
    /// protocol has no way to report zero zones, so zone A is assumed.
    pub fn zones(&self) -> Vec<Zone> {
        let installed: Vec<Zone> = Zone::ALL
            .into_iter()
            .filter(|zone| {
                let path = StatusPath::new(MODE_PLACEHOLDER, "CFG", format!("Z{zone}IS"));
                self.get_str(&path) == Some("Y")
            })
            .collect();
        if installed.is_empty() {
            vec![Zone::A]
        } else {
            installed
        }
    }

    pub fn zone_name(&self, zone: Zone) -> String {
        let path = StatusPath::new("SYST", "CFG", format!("Z{zone}"));
        match self.get_str(&path).map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Zone {zone}"),
        }
    }

    /// Leaf-level changes from `previous` to `self`.
    pub fn changes_since(&self, previous: &Status) -> Vec<Change> {
        let mut changes = Vec::new();
        diff_json(&previous.raw, &self.raw, "", &mut changes);
        changes
    }
}

/// True when `next` differs from `prev` (or there was no previous snapshot).
pub fn diff(prev: Option<&Status>, next: &Status) -> bool {
    prev.is_none_or(|p| p.raw != next.raw)
}

/// Installed zones for `status`, falling back to a single default zone.
pub fn enumerate_zones(status: &Status) -> Vec<Zone> {
    status.zones()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Status {
        Status::from_value(json!([
            {"SYST": {
                "CFG": {"TU": "C", "MTSP": "N", "ZA": "Lounge   ", "ZB": "        "},
                "OSS": {"MD": "H"}
            }},
            {"HGOM": {
                "CFG": {"ZAIS": "Y", "ZBIS": "Y", "ZCIS": "N"},
                "OOP": {"ST": "N", "FL": "08"},
                "GSO": {"SP": "21", "OP": "M"}
            }}
        ]))
        .unwrap()
    }

    #[test]
    fn parse_detects_mode() {
        assert_eq!(sample().mode(), Mode::Heat);
        let s = Status::parse(r#"[{"SYST":{}},{"ECOM":{"GSO":{"SW":"F"}}}]"#).unwrap();
        assert_eq!(s.mode(), Mode::Evaporative);
    }

    #[test]
    fn parse_rejects_bad_shapes() {
        assert!(matches!(Status::parse("{}"), Err(Error::Protocol(_))));
        assert!(matches!(Status::parse("[{}]"), Err(Error::Protocol(_))));
        assert!(matches!(
            Status::parse(r#"[{},{"HGOM":{},"CGOM":{}}]"#),
            Err(Error::Protocol(_))
        ));
        assert!(matches!(Status::parse(r#"[{},{"XXXX":{}}]"#), Err(Error::Protocol(_))));
        assert!(matches!(Status::parse("[{"), Err(Error::Json(_))));
    }

    #[test]
    fn get_routes_by_group() {
        let s = sample();
        assert_eq!(s.lookup("SYST.CFG.TU").unwrap(), Some(&json!("C")));
        assert_eq!(s.lookup("HGOM.GSO.SP").unwrap(), Some(&json!("21")));
        assert_eq!(s.lookup("{mode}.OOP.FL").unwrap(), Some(&json!("08")));
    }

    #[test]
    fn get_missing_is_none() {
        let s = sample();
        assert_eq!(s.lookup("SYST.XXX.TU").unwrap(), None);
        assert_eq!(s.lookup("CGOM.GSO.SP").unwrap(), None);
        assert_eq!(s.lookup("HGOM.GSO.ZZ").unwrap(), None);
        assert!(s.lookup("HGOM.GSO").is_err());
    }

    #[test]
    fn field_lookup_through_table() {
        let s = sample();
        let table = PathTable::default();
        assert_eq!(s.field(&table, Field::TargetTemp, None), Some("21"));
        assert_eq!(s.field(&table, Field::Mode, None), Some("H"));
        assert_eq!(s.field(&table, Field::PumpState, None), None);
    }

    #[test]
    fn zones_installed() {
        assert_eq!(sample().zones(), vec![Zone::A, Zone::B]);
    }

    #[test]
    fn zones_default_when_none_installed() {
        let s = Status::parse(r#"[{"SYST":{}},{"CGOM":{"CFG":{"ZAIS":"N"}}}]"#).unwrap();
        assert_eq!(enumerate_zones(&s), vec![Zone::A]);
    }

    #[test]
    fn zone_names_trimmed_or_defaulted() {
        let s = sample();
        assert_eq!(s.zone_name(Zone::A), "Lounge");
        assert_eq!(s.zone_name(Zone::B), "Zone B");
        assert_eq!(s.zone_name(Zone::D), "Zone D");
    }

    #[test]
    fn diff_reports_changes() {
        let a = sample();
        assert!(diff(None, &a));
        assert!(!diff(Some(&a), &a.clone()));

        let mut raw = a.as_value().clone();
        raw[1]["HGOM"]["GSO"]["SP"] = json!("23");
        let b = Status::from_value(raw).unwrap();
        assert!(diff(Some(&a), &b));
        let changes = b.changes_since(&a);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "1.HGOM.GSO.SP");
    }

    #[test]
    fn matches_compares_text() {
        let s = Status::parse(r#"[{"SYST":{}},{"HGOM":{"GSO":{"SP":21,"SW":"N"}}}]"#).unwrap();
        assert!(s.matches(&"HGOM.GSO.SP".parse().unwrap(), "21"));
        assert!(s.matches(&"HGOM.GSO.SW".parse().unwrap(), "N"));
        assert!(!s.matches(&"HGOM.GSO.SW".parse().unwrap(), "F"));
        assert!(!s.matches(&"HGOM.GSO.XX".parse().unwrap(), "N"));
    }
}
