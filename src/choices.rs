//! Fixed selection lists offered by the logbook forms.
//!
//! Every list is stored with the label written to the spreadsheets, so a
//! value round-trips through `Display` and `FromStr` unchanged.

use crate::error::LogbookError;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

lazy_static! {
    /// Plot numbers `1` to `32`, as labels.
    pub static ref PLOT_LABELS: Vec<String> = (Plot::MIN..=Plot::MAX).map(|p| p.to_string()).collect();
}

/// Declares a closed set of labelled values with parsing and display.
macro_rules! labelled_enum {
    ($(#[$meta:meta])* $name:ident, $what:literal { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            pub fn labels() -> Vec<&'static str> {
                Self::ALL.iter().map(|v| v.label()).collect()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $name {
            type Err = LogbookError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.label() == s)
                    .ok_or_else(|| LogbookError::validation(format!("unknown {}: {:?}", $what, s)))
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.label())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

labelled_enum!(
    /// Greenhouse ("serre") identifier.
    Greenhouse, "greenhouse" {
        B => "B",
        C => "C",
        D => "D",
        E => "E",
        F => "F",
        G => "G",
        H => "H",
    }
);

labelled_enum!(
    Crop, "crop" {
        Tomato => "tomate",
        Watermelon => "pastèque",
        Pepper => "poivron",
        Cucumber => "concombre",
        Lettuce => "laitue",
        Chives => "ciboulette",
        Zucchini => "courgette",
        Herbs => "herbes aromatiques",
    }
);

labelled_enum!(
    OperationKind, "operation" {
        Treatment => "traitement",
        Irrigation => "irrigation",
    }
);

labelled_enum!(
    TreatmentKind, "treatment type" {
        Fungicide => "fongicide",
        Insecticide => "insecticide",
        Acaricide => "acaricide",
        InsecticideAcaricide => "insecticide/acaricide",
        Rodenticide => "raticide",
        Biostimulant => "bio-stimulant",
        Disinfectant => "désinfectant",
        FoliarFertilizer => "engrais foliaire",
    }
);

labelled_enum!(
    /// Nutrient solution used for an irrigation.
    Solution, "irrigation solution" {
        Ab => "AB",
        Cd => "CD",
        M => "M",
        Urea => "Urée",
        Rooting => "enracineur",
        Disinfectant => "désinfectant",
    }
);

labelled_enum!(
    /// Electrical conductivity target of an irrigation solution.
    Ec, "EC" {
        Ec1_6 => "1.6",
        Ec1_8 => "1.8",
        Ec2 => "2",
        Ec2_5 => "2.5",
        Ec3 => "3",
        Ec3_5 => "3.5",
        Ec4 => "4",
    }
);

labelled_enum!(
    ApplicationMode, "application mode" {
        FoliarSpray => "pulvérisation foliaire",
        Fertigation => "fertigation",
        Drench => "arrosage au pied",
        Dusting => "poudrage",
    }
);

/// Plot ("delta") number inside a greenhouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Plot(u8);

impl Plot {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 32;

    pub fn new(n: u8) -> Result<Self, LogbookError> {
        if (Self::MIN..=Self::MAX).contains(&n) {
            Ok(Plot(n))
        } else {
            Err(LogbookError::validation(format!(
                "plot must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                n
            )))
        }
    }

    pub fn number(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Plot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Plot {
    type Err = LogbookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u8 = s
            .trim()
            .parse()
            .map_err(|_| LogbookError::validation(format!("unknown plot: {:?}", s.trim())))?;
        Plot::new(n)
    }
}

impl Serialize for Plot {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Plot {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// All selection lists, as rendered by the forms and `/api/choices`.
#[derive(Debug, Clone, Serialize)]
pub struct Choices {
    pub greenhouses: Vec<&'static str>,
    pub plots: Vec<String>,
    pub crops: Vec<&'static str>,
    pub operations: Vec<&'static str>,
    pub treatments: Vec<&'static str>,
    pub solutions: Vec<&'static str>,
    pub ecs: Vec<&'static str>,
    pub application_modes: Vec<&'static str>,
}

pub fn choices() -> Choices {
    Choices {
        greenhouses: Greenhouse::labels(),
        plots: PLOT_LABELS.clone(),
        crops: Crop::labels(),
        operations: OperationKind::labels(),
        treatments: TreatmentKind::labels(),
        solutions: Solution::labels(),
        ecs: Ec::labels(),
        application_modes: ApplicationMode::labels(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_parse_back() {
        for kind in TreatmentKind::ALL {
            assert_eq!(kind.label().parse::<TreatmentKind>().unwrap(), *kind);
        }
        assert_eq!("Urée".parse::<Solution>().unwrap(), Solution::Urea);
        assert_eq!(" B ".parse::<Greenhouse>().unwrap(), Greenhouse::B);
    }

    #[test]
    fn unknown_label_is_rejected() {
        assert!(matches!("A".parse::<Greenhouse>(), Err(LogbookError::Validation(_))));
        assert!("5".parse::<Ec>().is_err());
    }

    #[test]
    fn plots_cover_one_to_thirty_two() {
        assert_eq!(PLOT_LABELS.len(), 32);
        assert_eq!(PLOT_LABELS.first().map(String::as_str), Some("1"));
        assert_eq!(PLOT_LABELS.last().map(String::as_str), Some("32"));
        assert!("0".parse::<Plot>().is_err());
        assert!("33".parse::<Plot>().is_err());
        assert_eq!("7".parse::<Plot>().unwrap().number(), 7);
    }

    #[test]
    fn choices_serialize_as_labels() {
        let json = serde_json::to_value(choices()).unwrap();
        assert_eq!(json["operations"], serde_json::json!(["traitement", "irrigation"]));
        assert_eq!(json["greenhouses"].as_array().unwrap().len(), 7);
    }
}
