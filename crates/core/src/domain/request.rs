use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockCategory {
    #[default]
    Growth,
    Penny,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionDuration {
    #[serde(rename = "7 Days")]
    SevenDays,
    #[serde(rename = "15 Days")]
    FifteenDays,
    #[default]
    #[serde(rename = "1 Month")]
    OneMonth,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockSector {
    #[default]
    All,
    Banking,
    #[serde(rename = "IT")]
    It,
    Auto,
    Pharma,
    #[serde(rename = "FMCG")]
    Fmcg,
    Energy,
    Metal,
    Infra,
    Realty,
}

impl fmt::Display for StockCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StockCategory::Growth => "Growth",
            StockCategory::Penny => "Penny",
        };
        f.write_str(label)
    }
}

impl fmt::Display for PredictionDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PredictionDuration::SevenDays => "7 Days",
            PredictionDuration::FifteenDays => "15 Days",
            PredictionDuration::OneMonth => "1 Month",
        };
        f.write_str(label)
    }
}

impl fmt::Display for StockSector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StockSector::All => "All",
            StockSector::Banking => "Banking",
            StockSector::It => "IT",
            StockSector::Auto => "Auto",
            StockSector::Pharma => "Pharma",
            StockSector::Fmcg => "FMCG",
            StockSector::Energy => "Energy",
            StockSector::Metal => "Metal",
            StockSector::Infra => "Infra",
            StockSector::Realty => "Realty",
        };
        f.write_str(label)
    }
}

impl FromStr for StockCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "growth" => Ok(StockCategory::Growth),
            "penny" => Ok(StockCategory::Penny),
            other => bail!("unknown stock category {other:?} (expected Growth or Penny)"),
        }
    }
}

impl FromStr for PredictionDuration {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "7 days" | "7d" => Ok(PredictionDuration::SevenDays),
            "15 days" | "15d" => Ok(PredictionDuration::FifteenDays),
            "1 month" | "1m" => Ok(PredictionDuration::OneMonth),
            other => bail!("unknown duration {other:?} (expected 7 Days, 15 Days or 1 Month)"),
        }
    }
}

impl FromStr for StockSector {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "all" => Ok(StockSector::All),
            "banking" => Ok(StockSector::Banking),
            "it" => Ok(StockSector::It),
            "auto" => Ok(StockSector::Auto),
            "pharma" => Ok(StockSector::Pharma),
            "fmcg" => Ok(StockSector::Fmcg),
            "energy" => Ok(StockSector::Energy),
            "metal" => Ok(StockSector::Metal),
            "infra" => Ok(StockSector::Infra),
            "realty" => Ok(StockSector::Realty),
            other => bail!(
                "unknown sector {other:?} (expected All, Banking, IT, Auto, Pharma, FMCG, \
                 Energy, Metal, Infra or Realty)"
            ),
        }
    }
}

/// Lowercase with `-`/`_` treated as spaces, so CLI spellings like
/// `7-days` parse the same as the canonical label.
fn normalize(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| match c {
            '-' | '_' => ' ',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_labels_round_trip_through_serde() {
        for (duration, label) in [
            (PredictionDuration::SevenDays, "\"7 Days\""),
            (PredictionDuration::FifteenDays, "\"15 Days\""),
            (PredictionDuration::OneMonth, "\"1 Month\""),
        ] {
            assert_eq!(serde_json::to_string(&duration).unwrap(), label);
            assert_eq!(
                serde_json::from_str::<PredictionDuration>(label).unwrap(),
                duration
            );
        }

        assert_eq!(serde_json::to_string(&StockSector::It).unwrap(), "\"IT\"");
        assert_eq!(
            serde_json::from_str::<StockSector>("\"FMCG\"").unwrap(),
            StockSector::Fmcg
        );
    }

    #[test]
    fn display_matches_serialized_label() {
        assert_eq!(StockCategory::Penny.to_string(), "Penny");
        assert_eq!(PredictionDuration::SevenDays.to_string(), "7 Days");
        assert_eq!(StockSector::Fmcg.to_string(), "FMCG");
    }

    #[test]
    fn from_str_accepts_relaxed_spellings() {
        assert_eq!(
            "penny".parse::<StockCategory>().unwrap(),
            StockCategory::Penny
        );
        assert_eq!(
            "7-days".parse::<PredictionDuration>().unwrap(),
            PredictionDuration::SevenDays
        );
        assert_eq!(
            "7d".parse::<PredictionDuration>().unwrap(),
            PredictionDuration::SevenDays
        );
        assert_eq!(
            "1 Month".parse::<PredictionDuration>().unwrap(),
            PredictionDuration::OneMonth
        );
        assert_eq!(
            "1m".parse::<PredictionDuration>().unwrap(),
            PredictionDuration::OneMonth
        );
        assert_eq!("it".parse::<StockSector>().unwrap(), StockSector::It);
        assert!("crypto".parse::<StockSector>().is_err());
    }

    #[test]
    fn defaults_match_initial_controls() {
        assert_eq!(StockCategory::default(), StockCategory::Growth);
        assert_eq!(PredictionDuration::default(), PredictionDuration::OneMonth);
        assert_eq!(StockSector::default(), StockSector::All);
    }
}
