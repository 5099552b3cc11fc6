//! Component metadata: kinds, values, packages and recorded measurements.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProbeError, Result};
use crate::value::{is_unmeasured, Capacitance, Resistance, ValueError, Voltage};

/// Component kind, derived from the letters of the reference designator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Resistor,
    Capacitor,
    Inductor,
    Diode,
    Transistor,
    Ic,
    Connector,
    Transformer,
    Fuse,
    Switch,
    Led,
    Testpoint,
    #[default]
    Other,
}

impl ComponentKind {
    /// `R12` -> resistor, `LED3` -> led, `SW1` -> switch.
    pub fn from_reference(reference: &str) -> Self {
        let prefix: String = reference
            .chars()
            .filter(|c| c.is_alphabetic())
            .collect::<String>()
            .to_uppercase();
        match prefix.as_str() {
            "R" => Self::Resistor,
            "C" => Self::Capacitor,
            "L" => Self::Inductor,
            "D" => Self::Diode,
            "Q" => Self::Transistor,
            "U" => Self::Ic,
            "J" => Self::Connector,
            "T" => Self::Transformer,
            "F" => Self::Fuse,
            "SW" => Self::Switch,
            "LED" => Self::Led,
            "TP" => Self::Testpoint,
            _ => Self::Other,
        }
    }

    pub fn default_pins(self) -> u32 {
        match self {
            Self::Transistor => 3,
            Self::Testpoint => 1,
            _ => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resistor => "resistor",
            Self::Capacitor => "capacitor",
            Self::Inductor => "inductor",
            Self::Diode => "diode",
            Self::Transistor => "transistor",
            Self::Ic => "ic",
            Self::Connector => "connector",
            Self::Transformer => "transformer",
            Self::Fuse => "fuse",
            Self::Switch => "switch",
            Self::Led => "led",
            Self::Testpoint => "testpoint",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a value field for a component of `kind`.
///
/// Resistors and capacitors go through their value grammar; other kinds keep
/// the text as typed. Placeholders (`TBD`, `DNP`, ...) become `None`.
pub fn normalize_value(kind: ComponentKind, text: &str) -> std::result::Result<Option<String>, ValueError> {
    match kind {
        ComponentKind::Resistor => Ok(Resistance::parse(text)?.measured().map(|r| r.to_string())),
        ComponentKind::Capacitor => Ok(Capacitance::parse(text)?.measured().map(|c| c.to_string())),
        _ if is_unmeasured(text) => Ok(None),
        _ => Ok(Some(text.trim().to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransistorType {
    Npn,
    Pnp,
    #[serde(alias = "N-FET")]
    Nfet,
    #[serde(alias = "P-FET")]
    Pfet,
    Nmos,
    Pmos,
}

impl FromStr for TransistorType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NPN" => Ok(Self::Npn),
            "PNP" => Ok(Self::Pnp),
            "NFET" | "N-FET" => Ok(Self::Nfet),
            "PFET" | "P-FET" => Ok(Self::Pfet),
            "NMOS" => Ok(Self::Nmos),
            "PMOS" => Ok(Self::Pmos),
            _ => Err(()),
        }
    }
}

impl fmt::Display for TransistorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Npn => "NPN",
            Self::Pnp => "PNP",
            Self::Nfet => "NFET",
            Self::Pfet => "PFET",
            Self::Nmos => "NMOS",
            Self::Pmos => "PMOS",
        };
        f.write_str(s)
    }
}

/// What a measurement command records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementKind {
    Resistance,
    Capacitance,
    ForwardVoltage,
    Hfe,
    ThresholdVoltage,
    TransistorType,
    Marking,
}

impl FromStr for MeasurementKind {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "r" | "resistance" | "ohms" => Ok(Self::Resistance),
            "c" | "capacitance" | "cap" => Ok(Self::Capacitance),
            "vf" | "forward" | "diode" => Ok(Self::ForwardVoltage),
            "hfe" | "gain" | "beta" => Ok(Self::Hfe),
            "vbe" | "vgs" | "vth" => Ok(Self::ThresholdVoltage),
            "type" | "polarity" => Ok(Self::TransistorType),
            "marking" | "mark" | "label" => Ok(Self::Marking),
            _ => Err(ProbeError::UnknownMeasurement {
                kind: s.to_string(),
            }),
        }
    }
}

impl MeasurementKind {
    fn label(self) -> &'static str {
        match self {
            Self::Resistance => "resistance",
            Self::Capacitance => "capacitance",
            Self::ForwardVoltage => "forward voltage",
            Self::Hfe => "hFE",
            Self::ThresholdVoltage => "Vbe/Vth",
            Self::TransistorType => "transistor type",
            Self::Marking => "marking",
        }
    }
}

/// Values measured on the bench for one component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredMeasurements")]
pub struct Measurements {
    #[serde(rename = "resistance_ohms", skip_serializing_if = "Option::is_none")]
    pub resistance: Option<Resistance>,
    #[serde(rename = "capacitance_nf", skip_serializing_if = "Option::is_none")]
    pub capacitance: Option<Capacitance>,
    #[serde(rename = "vf", skip_serializing_if = "Option::is_none")]
    pub forward_voltage: Option<Voltage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hfe: Option<f64>,
    #[serde(rename = "vbe", skip_serializing_if = "Option::is_none")]
    pub threshold_voltage: Option<Voltage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transistor_type: Option<TransistorType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marking: Option<String>,
}

/// On-disk form of [`Measurements`]. Older files keep `resistance` in ohms
/// and `capacitance` in farads.
#[derive(Deserialize, Default)]
#[serde(default)]
struct StoredMeasurements {
    #[serde(alias = "resistance")]
    resistance_ohms: Option<Resistance>,
    capacitance_nf: Option<Capacitance>,
    #[serde(rename = "capacitance")]
    capacitance_farads: Option<f64>,
    vf: Option<Voltage>,
    hfe: Option<f64>,
    vbe: Option<Voltage>,
    transistor_type: Option<TransistorType>,
    marking: Option<String>,
}

impl From<StoredMeasurements> for Measurements {
    fn from(stored: StoredMeasurements) -> Self {
        let farads = stored
            .capacitance_farads
            .map(|f| Capacitance::from_nanofarads(f * 1e9));
        Self {
            resistance: stored.resistance_ohms,
            capacitance: stored.capacitance_nf.or(farads),
            forward_voltage: stored.vf,
            hfe: stored.hfe,
            threshold_voltage: stored.vbe,
            transistor_type: stored.transistor_type,
            marking: stored.marking,
        }
    }
}

impl Measurements {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Short form for listings: `R=4.7k, hFE=150, 'A7'`.
    pub fn summary(&self) -> Vec<String> {
        let mut parts = Vec::new();
        if let Some(r) = self.resistance {
            parts.push(format!("R={r}"));
        }
        if let Some(c) = self.capacitance {
            parts.push(format!("C={c}"));
        }
        if let Some(v) = self.forward_voltage {
            parts.push(format!("Vf={v}"));
        }
        if let Some(h) = self.hfe {
            parts.push(format!("hFE={h:.0}"));
        }
        if let Some(v) = self.threshold_voltage {
            parts.push(format!("Vbe={v}"));
        }
        if let Some(t) = self.transistor_type {
            parts.push(t.to_string());
        }
        if let Some(m) = &self.marking {
            parts.push(format!("'{m}'"));
        }
        parts
    }
}

fn unknown() -> String {
    "?".to_string()
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// One component record. The reference is the key in [`ComponentStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub pins: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default = "unknown")]
    pub package: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: ComponentKind,
    #[serde(default, skip_serializing_if = "Measurements::is_empty")]
    pub measured: Measurements,
    /// Created by a connection rather than explicitly; the pin count grows
    /// as higher pin numbers are referenced.
    #[serde(default, skip_serializing_if = "is_false")]
    pub inferred: bool,
    /// Value guessed from the circuit, not yet measured.
    #[serde(default, skip_serializing_if = "is_false")]
    pub predicted: bool,
}

impl Component {
    /// A component with its kind's default pin count and nothing recorded.
    pub fn new(reference: &str) -> Self {
        let kind = ComponentKind::from_reference(reference);
        Self {
            pins: kind.default_pins(),
            value: None,
            package: unknown(),
            description: String::new(),
            kind,
            measured: Measurements::default(),
            inferred: false,
            predicted: false,
        }
    }

    pub fn with_pins(mut self, pins: u32) -> Self {
        self.pins = pins.max(1);
        self
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    /// Set the value, normalized for this component's kind.
    pub fn with_value(mut self, text: &str) -> std::result::Result<Self, ValueError> {
        self.value = normalize_value(self.kind, text)?;
        Ok(self)
    }

    pub fn display_value(&self) -> &str {
        self.value.as_deref().unwrap_or("?")
    }

    /// Record a measurement, returning a one-line description of it.
    ///
    /// Resistance, capacitance and forward voltage also replace the display
    /// value. Nothing changes if `text` does not parse.
    pub fn record(&mut self, kind: MeasurementKind, text: &str) -> Result<String> {
        let bad = || ProbeError::InvalidMeasurement {
            kind: kind.label().to_string(),
            input: text.to_string(),
        };

        let line = match kind {
            MeasurementKind::Resistance => {
                let r = Resistance::parse(text)?.measured().ok_or_else(bad)?;
                self.measured.resistance = Some(r);
                self.value = Some(r.to_string());
                format!("Resistance = {r}")
            }
            MeasurementKind::Capacitance => {
                let c = Capacitance::parse(text)?.measured().ok_or_else(bad)?;
                self.measured.capacitance = Some(c);
                self.value = Some(c.to_string());
                format!("Capacitance = {c}")
            }
            MeasurementKind::ForwardVoltage => {
                let v = Voltage::parse(text)?.measured().ok_or_else(bad)?;
                self.measured.forward_voltage = Some(v);
                self.value = Some(format!("Vf={v}"));
                format!("Forward Voltage = {v}")
            }
            MeasurementKind::Hfe => {
                let hfe = text
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|h| h.is_finite() && *h >= 0.0)
                    .ok_or_else(bad)?;
                self.measured.hfe = Some(hfe);
                format!("hFE = {hfe:.0}")
            }
            MeasurementKind::ThresholdVoltage => {
                let v = Voltage::parse(text)?.measured().ok_or_else(bad)?;
                self.measured.threshold_voltage = Some(v);
                format!("Vbe/Vth = {v}")
            }
            MeasurementKind::TransistorType => {
                let t = text.parse::<TransistorType>().map_err(|_| bad())?;
                self.measured.transistor_type = Some(t);
                format!("Type = {t}")
            }
            MeasurementKind::Marking => {
                let marking = text.trim();
                if marking.is_empty() {
                    return Err(bad());
                }
                self.measured.marking = Some(marking.to_string());
                format!("Marking = {marking}")
            }
        };
        Ok(line)
    }

    /// Measurement kind chosen by the quick-measure command.
    pub fn quick_kind(&self, text: &str) -> MeasurementKind {
        match self.kind {
            ComponentKind::Resistor => MeasurementKind::Resistance,
            ComponentKind::Capacitor => MeasurementKind::Capacitance,
            ComponentKind::Diode | ComponentKind::Led => MeasurementKind::ForwardVoltage,
            ComponentKind::Transistor if text.parse::<TransistorType>().is_ok() => {
                MeasurementKind::TransistorType
            }
            ComponentKind::Transistor => MeasurementKind::Hfe,
            _ => MeasurementKind::Marking,
        }
    }
}

/// All components of a project, keyed and iterated by reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentStore {
    components: BTreeMap<String, Component>,
}

impl ComponentStore {
    pub fn get(&self, reference: &str) -> Option<&Component> {
        self.components.get(reference)
    }

    pub(crate) fn get_mut(&mut self, reference: &str) -> Option<&mut Component> {
        self.components.get_mut(reference)
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.components.contains_key(reference)
    }

    pub fn pin_count(&self, reference: &str) -> Option<u32> {
        self.components.get(reference).map(|c| c.pins)
    }

    /// Add or replace a component, returning the previous record.
    pub fn insert(&mut self, reference: &str, component: Component) -> Option<Component> {
        self.components.insert(reference.to_string(), component)
    }

    pub fn remove(&mut self, reference: &str) -> Option<Component> {
        self.components.remove(reference)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Component)> {
        self.components.iter().map(|(r, c)| (r.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub(crate) fn as_map(&self) -> &BTreeMap<String, Component> {
        &self.components
    }

    pub(crate) fn from_map(components: BTreeMap<String, Component>) -> Self {
        Self { components }
    }
}
