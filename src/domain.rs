use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level administrative region, keyed by the official 1..=52 numeric code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Province {
    pub code: u8,
    pub name: String,
}

/// Municipality-level region, keyed by name plus owning province.
///
/// `code` stays unset until the persistence boundary assigns one; the
/// resolver never invents integer codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Locality {
    pub code: Option<i64>,
    pub name: String,
    pub province_code: u8,
}

/// A vehicle-inspection facility record, the unit ultimately persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub kind: StationKind,
    pub address: Option<String>,
    pub postal_code: Option<i64>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub description: Option<String>,
    pub schedule: Option<String>,
    pub contact: Option<String>,
    pub url: Option<String>,
    /// Set only after identity resolution links the station to a locality.
    pub locality_code: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StationKind {
    Fixed,
    Mobile,
    Other,
}

impl StationKind {
    /// Classifies free text into a station kind, matching "fija"/"móvil"
    /// tokens case- and diacritic-insensitively. Anything else is `Other`.
    pub fn classify(text: Option<&str>) -> Self {
        let Some(text) = text else {
            return StationKind::Other;
        };

        let folded = fold_diacritics(&text.trim().to_lowercase());
        if folded.contains("fija") {
            StationKind::Fixed
        } else if folded.contains("movil") {
            StationKind::Mobile
        } else {
            StationKind::Other
        }
    }
}

impl fmt::Display for StationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StationKind::Fixed => "fixed",
            StationKind::Mobile => "mobile",
            StationKind::Other => "other",
        };
        write!(f, "{}", label)
    }
}

/// The three regional registries this integrator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    Galicia,
    Catalonia,
    Valencia,
}

impl Region {
    pub const ALL: [Region; 3] = [Region::Valencia, Region::Galicia, Region::Catalonia];

    pub fn id(&self) -> &'static str {
        match self {
            Region::Galicia => "galicia",
            Region::Catalonia => "catalonia",
            Region::Valencia => "valencia",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// A resolved geographic position, always in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Replaces accented vowels and ñ with their ASCII base letters.
///
/// Source registries mix Galician, Catalan and Spanish spellings; all
/// token matching in the pipeline happens on folded text.
pub fn fold_diacritics(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            'Á' | 'À' | 'Ä' | 'Â' => 'A',
            'É' | 'È' | 'Ë' | 'Ê' => 'E',
            'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
            'Ó' | 'Ò' | 'Ö' | 'Ô' => 'O',
            'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
            'Ñ' => 'N',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_matches_fixed_and_mobile_tokens() {
        assert_eq!(StationKind::classify(Some("Estación_fija")), StationKind::Fixed);
        assert_eq!(StationKind::classify(Some("ESTACIÓN MÓVIL")), StationKind::Mobile);
        assert_eq!(StationKind::classify(Some("movil")), StationKind::Mobile);
        assert_eq!(StationKind::classify(Some("otros")), StationKind::Other);
        assert_eq!(StationKind::classify(None), StationKind::Other);
    }

    #[test]
    fn fold_diacritics_handles_spanish_letters() {
        assert_eq!(fold_diacritics("A Coruña"), "A Coruna");
        assert_eq!(fold_diacritics("Castelló"), "Castello");
        assert_eq!(fold_diacritics("sin acentos"), "sin acentos");
    }
}
