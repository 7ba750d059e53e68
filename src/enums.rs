use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

/// Mapping between the position of a slice in the file list and its Z
/// coordinate in the assembled volume.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackingOrder {
    /// First slice of the list lands on `z = 0`
    #[default]
    LowToHigh,
    /// First slice of the list lands on `z = zpoints - 1`
    HighToLow,
    Unknown,
}

/// The per-pixel quantities carried by an EBSD scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attribute {
    Euler1,
    Euler2,
    Euler3,
    XPosition,
    YPosition,
    ImageQuality,
    ConfidenceIndex,
    Phase,
    SemSignal,
    Fit,
}

impl Attribute {
    pub const ALL: [Attribute; 10] = [
        Attribute::Euler1,
        Attribute::Euler2,
        Attribute::Euler3,
        Attribute::XPosition,
        Attribute::YPosition,
        Attribute::ImageQuality,
        Attribute::ConfidenceIndex,
        Attribute::Phase,
        Attribute::SemSignal,
        Attribute::Fit,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Attribute::Euler1 => "euler1",
            Attribute::Euler2 => "euler2",
            Attribute::Euler3 => "euler3",
            Attribute::XPosition => "x",
            Attribute::YPosition => "y",
            Attribute::ImageQuality => "iq",
            Attribute::ConfidenceIndex => "ci",
            Attribute::Phase => "phase",
            Attribute::SemSignal => "sem",
            Attribute::Fit => "fit",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|attribute| attribute.name().eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_names_round_trip() {
        for attribute in Attribute::ALL {
            assert_eq!(Attribute::from_name(attribute.name()), Some(attribute));
        }
        assert_eq!(Attribute::from_name("IQ"), Some(Attribute::ImageQuality));
        assert_eq!(Attribute::from_name("bogus"), None);
    }

    #[test]
    fn stacking_order_deserializes_snake_case() {
        #[derive(Deserialize)]
        struct Holder {
            order: StackingOrder,
        }
        let holder: Holder = toml::from_str("order = \"high_to_low\"").unwrap();
        assert_eq!(holder.order, StackingOrder::HighToLow);
    }
}
