//! Pin identities and the textual pin grammar.
//!
//! A pin is written `REF-N` (numbered), `REF-TAB` (tab or mounting lug) or
//! bare `REF` (a component with a single pin). [`PinRegistry::canonicalize`]
//! is the only way text becomes a [`PinId`]; every entry point that accepts
//! pin text goes through it, so `GND` and `GND-1` can never drift apart for a
//! one-pin component.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::component::{ComponentKind, ComponentStore};
use crate::config::Settings;
use crate::error::{ProbeError, Result};

/// Which contact of a component a pin is.
///
/// Ordering puts `Single` first, then numbers ascending, then `Tab`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PinDesignator {
    /// The only pin of a one-pin component, written as the bare reference
    Single,
    Number(u32),
    Tab,
}

/// Canonical pin identity: component reference plus designator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PinId {
    reference: String,
    designator: PinDesignator,
}

impl PinId {
    pub fn new(reference: impl Into<String>, designator: PinDesignator) -> Self {
        Self {
            reference: reference.into(),
            designator,
        }
    }

    pub fn single(reference: impl Into<String>) -> Self {
        Self::new(reference, PinDesignator::Single)
    }

    pub fn numbered(reference: impl Into<String>, number: u32) -> Self {
        Self::new(reference, PinDesignator::Number(number))
    }

    pub fn tab(reference: impl Into<String>) -> Self {
        Self::new(reference, PinDesignator::Tab)
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn designator(&self) -> PinDesignator {
        self.designator
    }

    /// Pin number as a netlist tool expects it (`1` for single-pin parts).
    pub fn pin_label(&self) -> String {
        match self.designator {
            PinDesignator::Single => "1".to_string(),
            PinDesignator::Number(n) => n.to_string(),
            PinDesignator::Tab => "TAB".to_string(),
        }
    }

    /// Same pin, rewritten for a component that now has `pin_count` pins.
    pub(crate) fn recanonicalized(&self, pin_count: u32) -> PinId {
        let designator = match self.designator {
            PinDesignator::Number(1) if pin_count == 1 => PinDesignator::Single,
            PinDesignator::Single if pin_count > 1 => PinDesignator::Number(1),
            other => other,
        };
        Self::new(self.reference.clone(), designator)
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.designator {
            PinDesignator::Single => f.write_str(&self.reference),
            PinDesignator::Number(n) => write!(f, "{}-{}", self.reference, n),
            PinDesignator::Tab => write!(f, "{}-TAB", self.reference),
        }
    }
}

impl Serialize for PinId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Pin text after syntax checks, before the component store is consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinRef {
    pub reference: String,
    /// `None` for the bare `REF` form
    pub designator: Option<PinDesignator>,
}

/// Turns pin text into canonical [`PinId`]s.
#[derive(Debug, Clone, Default)]
pub struct PinRegistry {
    pad_references: bool,
}

impl PinRegistry {
    pub fn new(settings: &Settings) -> Self {
        Self {
            pad_references: settings.pad_references,
        }
    }

    /// Apply reference normalization (`D4` -> `D04` when padding is on).
    /// Case is preserved either way.
    pub fn normalize_reference(&self, reference: &str) -> String {
        let reference = reference.trim();
        if !self.pad_references {
            return reference.to_string();
        }
        let split = reference
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(reference.len());
        let (prefix, digits) = reference.split_at(split);
        let well_formed = !prefix.is_empty()
            && prefix.chars().all(|c| c.is_alphabetic())
            && !digits.is_empty()
            && digits.chars().all(|c| c.is_ascii_digit());
        match digits.parse::<u32>() {
            Ok(n) if well_formed && n < 10 => format!("{prefix}{n:02}"),
            _ => reference.to_string(),
        }
    }

    /// Syntax-only parse of `REF`, `REF-N` or `REF-TAB`.
    pub fn parse(&self, text: &str) -> Result<PinRef> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ProbeError::malformed_pin(text, "empty pin"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(ProbeError::malformed_pin(text, "pin contains whitespace"));
        }

        let (reference, designator) = match trimmed.split_once('-') {
            None => (trimmed, None),
            Some((reference, suffix)) => (reference, Some(Self::parse_suffix(text, suffix)?)),
        };
        if reference.is_empty() {
            return Err(ProbeError::malformed_pin(text, "empty reference"));
        }

        Ok(PinRef {
            reference: self.normalize_reference(reference),
            designator,
        })
    }

    fn parse_suffix(text: &str, suffix: &str) -> Result<PinDesignator> {
        if suffix.eq_ignore_ascii_case("TAB") {
            return Ok(PinDesignator::Tab);
        }
        if suffix.is_empty() {
            return Err(ProbeError::malformed_pin(text, "missing pin number"));
        }
        if suffix.starts_with('-') {
            return Err(ProbeError::malformed_pin(text, "negative pin number"));
        }
        if !suffix.chars().all(|c| c.is_ascii_digit()) {
            return Err(ProbeError::malformed_pin(
                text,
                format!("pin '{suffix}' is neither a number nor TAB"),
            ));
        }
        match suffix.parse::<u32>() {
            Ok(0) => Err(ProbeError::malformed_pin(text, "pin numbers start at 1")),
            Ok(n) => Ok(PinDesignator::Number(n)),
            Err(_) => Err(ProbeError::malformed_pin(text, "pin number too large")),
        }
    }

    /// Parse `text` and resolve the single-pin ambiguity against `components`.
    ///
    /// `REF-1` and `REF` are the same pin when `REF` has exactly one pin.
    /// Unknown references are resolved as if created with their kind's
    /// default pin count, which is how implicit creation will size them.
    pub fn canonicalize(&self, text: &str, components: &ComponentStore) -> Result<PinId> {
        let PinRef {
            reference,
            designator,
        } = self.parse(text)?;
        let pin_count = components.pin_count(&reference);

        let designator = match designator {
            None => match pin_count {
                Some(count) if count > 1 => {
                    return Err(ProbeError::malformed_pin(
                        text,
                        format!("{reference} has {count} pins; give a pin number"),
                    ));
                }
                _ => PinDesignator::Single,
            },
            Some(PinDesignator::Number(1)) => {
                let single = match pin_count {
                    Some(count) => count == 1,
                    None => ComponentKind::from_reference(&reference).default_pins() == 1,
                };
                if single {
                    PinDesignator::Single
                } else {
                    PinDesignator::Number(1)
                }
            }
            Some(other) => other,
        };

        Ok(PinId::new(reference, designator))
    }
}
