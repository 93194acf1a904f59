use std::fmt;
use std::str::FromStr;

use crate::types::{Mode, Zone};
use crate::Error;

/// Group key routing a path to the system object (status index 0).
pub const SYSTEM_GROUP: &str = "SYST";
/// Placeholder group resolved against the currently active mode key.
pub const MODE_PLACEHOLDER: &str = "{mode}";

/// Three-segment address into a status tree: `group.section.command`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatusPath {
    pub group: String,
    pub section: String,
    pub command: String,
}

impl StatusPath {
    pub fn new(
        group: impl Into<String>,
        section: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            section: section.into(),
            command: command.into(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.group == SYSTEM_GROUP
    }

    /// Index into the two-slot status array this path reads from.
    pub fn slot(&self) -> usize {
        if self.is_system() { 0 } else { 1 }
    }

    /// Replace a `{mode}` group placeholder with the concrete mode key.
    pub fn with_mode(&self, mode: Mode) -> StatusPath {
        if self.group == MODE_PLACEHOLDER {
            StatusPath {
                group: mode.as_key().to_string(),
                ..self.clone()
            }
        } else {
            self.clone()
        }
    }
}

impl FromStr for StatusPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(g), Some(sec), Some(cmd), None)
                if !g.is_empty() && !sec.is_empty() && !cmd.is_empty() =>
            {
                Ok(StatusPath::new(g, sec, cmd))
            }
            _ => Err(Error::InvalidPath(s.to_string())),
        }
    }
}

impl fmt::Display for StatusPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.group, self.section, self.command)
    }
}

/// Semantic names for the status fields the unit exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    MultiSetPoint,
    TempUnits,
    ZoneName,
    HasHeater,
    HasCooler,
    HasEvaporative,
    Mode,

    State,
    FanState,
    FanSpeed,
    ControlMode,
    TargetTemp,
    ScheduleOverride,
    SystemActive,
    SchedulePeriod,
    CurrentTemp,
    AutoEnabled,
    UserEnabled,
    ZoneInstalled,
    PumpState,
}

fn system_template(field: Field) -> Option<&'static str> {
    Some(match field {
        Field::MultiSetPoint => "SYST.CFG.MTSP",
        Field::TempUnits => "SYST.CFG.TU",
        Field::ZoneName => "SYST.CFG.Z{zone}",
        Field::HasHeater => "SYST.AVM.HG",
        Field::HasCooler => "SYST.AVM.CG",
        Field::HasEvaporative => "SYST.AVM.EC",
        Field::Mode => "SYST.OSS.MD",
        _ => return None,
    })
}

// Heat and cool share a layout. State and FanState read the same key:
// "N"/"F" for on/off, "Z" while only the fan is running.
fn heat_cool_template(field: Field) -> Option<&'static str> {
    Some(match field {
        Field::State | Field::FanState => "{mode}.OOP.ST",
        Field::FanSpeed => "{mode}.OOP.FL",
        Field::ControlMode => "{mode}.{gz}O.OP",
        Field::TargetTemp => "{mode}.{gz}O.SP",
        Field::ScheduleOverride => "{mode}.{gz}O.AO",
        Field::SystemActive => "{mode}.GSS.{m}C",
        Field::SchedulePeriod => "{mode}.{gz}S.AT",
        Field::CurrentTemp => "{mode}.Z{zone}S.MT",
        Field::AutoEnabled => "{mode}.Z{zone}S.AE",
        Field::UserEnabled => "{mode}.Z{zone}O.UE",
        Field::ZoneInstalled => "{mode}.CFG.Z{zone}IS",
        _ => return None,
    })
}

fn evaporative_template(field: Field) -> Option<&'static str> {
    Some(match field {
        Field::State => "ECOM.GSO.SW",
        Field::FanState => "ECOM.GSO.FS",
        Field::FanSpeed => "ECOM.GSO.FL",
        Field::ControlMode => "ECOM.GSO.OP",
        // comfort level 19-34, see `comfort_to_celsius`
        Field::TargetTemp => "ECOM.GSO.SP",
        Field::SystemActive => "ECOM.GSS.BY",
        Field::CurrentTemp => "ECOM.GSS.MT",
        Field::AutoEnabled => "ECOM.GSS.Z{zone}AE",
        Field::UserEnabled => "ECOM.GSO.Z{zone}UE",
        Field::ZoneInstalled => "ECOM.CFG.Z{zone}IS",
        Field::PumpState => "ECOM.GSO.PS",
        _ => return None,
    })
}

/// Maps semantic fields onto concrete paths for a given mode and zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathTable {
    /// Units with one controller per zone address schedule and set point
    /// fields per zone instead of globally.
    pub multi_set_point: bool,
}

impl PathTable {
    pub fn new(multi_set_point: bool) -> Self {
        Self { multi_set_point }
    }

    /// Resolve `field` for `mode`. Zone-scoped templates need `zone`; when
    /// it is `None` they resolve to zone A.
    pub fn resolve(&self, field: Field, mode: Mode, zone: Option<Zone>) -> Option<StatusPath> {
        let template = system_template(field).or_else(|| match mode {
            Mode::Heat | Mode::Cool => heat_cool_template(field),
            Mode::Evaporative => evaporative_template(field),
        })?;

        let key = mode.as_key();
        let zone = zone.unwrap_or(Zone::A).letter().to_string();
        let gz = if self.multi_set_point {
            format!("Z{zone}")
        } else {
            "GS".to_string()
        };
        let path = template
            .replace("{mode}", key)
            .replace("{m}", &key[..1])
            .replace("{gz}", &gz)
            .replace("{zone}", &zone);

        path.parse().ok()
    }
}
