use std::{fmt, str::FromStr};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

/// Linear units a search buffer can be expressed in.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    Feet,
    #[default]
    Miles,
    Kilometers,
    Meters,
    Yards,
}

impl DistanceUnit {
    pub fn meters_per_unit(&self) -> f64 {
        match self {
            DistanceUnit::Feet => 0.3048,
            DistanceUnit::Miles => 1609.344,
            DistanceUnit::Kilometers => 1000.0,
            DistanceUnit::Meters => 1.0,
            DistanceUnit::Yards => 0.9144,
        }
    }

    pub fn abbreviation(&self) -> &'static str {
        match self {
            DistanceUnit::Feet => "ft",
            DistanceUnit::Miles => "mi",
            DistanceUnit::Kilometers => "km",
            DistanceUnit::Meters => "m",
            DistanceUnit::Yards => "yd",
        }
    }

    /// Largest buffer distance accepted for this unit.
    pub fn max_buffer_limit(&self) -> f64 {
        match self {
            DistanceUnit::Feet => 5_280_000.0,
            DistanceUnit::Miles => 1000.0,
            DistanceUnit::Kilometers => 1609.344,
            DistanceUnit::Meters => 1_609_344.0,
            DistanceUnit::Yards => 1_760_000.0,
        }
    }

    /// Default unit of a portal, `english` portals measure in miles.
    pub fn portal_default(portal_units: Option<&str>) -> Self {
        match portal_units {
            Some("english") => DistanceUnit::Miles,
            _ => DistanceUnit::Kilometers,
        }
    }
}

impl FromStr for DistanceUnit {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "feet" | "foot" | "ft" => Ok(DistanceUnit::Feet),
            "miles" | "mile" | "mi" => Ok(DistanceUnit::Miles),
            "kilometers" | "kilometer" | "km" => Ok(DistanceUnit::Kilometers),
            "meters" | "meter" | "m" => Ok(DistanceUnit::Meters),
            "yards" | "yard" | "yd" => Ok(DistanceUnit::Yards),
            other => Err(anyhow!("Unknown distance unit '{}'", other)),
        }
    }
}

impl fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

pub fn convert(value: f64, from: DistanceUnit, to: DistanceUnit) -> f64 {
    if from == to {
        return value;
    }
    value * from.meters_per_unit() / to.meters_per_unit()
}

/// Cap `distance` at the buffer limit of `unit`.
pub fn cap_buffer_distance(distance: f64, unit: DistanceUnit) -> f64 {
    let max_distance = unit.max_buffer_limit();
    if distance > max_distance {
        log::warn!(
            "Buffer distance {} exceeds the limit for {}, using {}",
            distance,
            unit,
            max_distance
        );
        return max_distance;
    }
    distance
}
