//! The probing session engine.
//!
//! [`Project`] owns every store and is the only thing that mutates them. Each
//! operation canonicalizes its pin text, validates everything it is about to
//! change and only then mutates, so a failed call leaves the project exactly
//! as it was.
//!
//! Adding a connection extends the live union-find forest. Anything that
//! removes or rewrites connections goes through `restructure`,
//! which rebuilds the nets from the edge set and moves name bindings whose
//! pins disappeared.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use serde::Serialize;

use crate::audit;
use crate::component::{normalize_value, Component, ComponentStore, MeasurementKind};
use crate::config::Settings;
use crate::connection::{Connection, ConnectionStore, MergeOutcome};
use crate::error::{ProbeError, Result};
use crate::naming::{NameConflict, NetNameRegistry, Resolution};
use crate::nets::{Net, NetBuilder};
use crate::pin::{PinDesignator, PinId, PinRegistry};
use crate::value::ValueError;

/// Component fields that `cedit` can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentField {
    Pins,
    Value,
    Package,
    Description,
}

impl FromStr for ComponentField {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pins" => Ok(Self::Pins),
            "value" => Ok(Self::Value),
            "package" => Ok(Self::Package),
            "description" | "desc" => Ok(Self::Description),
            _ => Err(ProbeError::UnknownField {
                field: s.to_string(),
            }),
        }
    }
}

/// What [`Project::add_connection`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Added {
    pub connection: Connection,
    /// `false` when the connection was already recorded
    pub new: bool,
    /// References created on the fly for this connection
    pub created: Vec<String>,
}

/// Unconnected pins of one multi-pin component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemainingPins {
    pub reference: String,
    pub value: String,
    pub pins: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectStats {
    pub components: usize,
    pub connections: usize,
    pub nets: usize,
    pub named_nets: usize,
    pub measured: usize,
    /// Component count per reference prefix (`R`, `C`, `U`, ...)
    pub by_prefix: BTreeMap<String, usize>,
}

/// Nets together with their resolved names.
#[derive(Debug, Clone)]
pub struct Netlist {
    pub nets: Vec<Net>,
    pub names: Resolution,
}

impl Netlist {
    pub fn name_of(&self, net: &Net) -> Option<&str> {
        self.names.name_of(net)
    }

    pub fn conflicts(&self) -> &[NameConflict] {
        &self.names.conflicts
    }

    pub fn pin_count(&self) -> usize {
        self.nets.iter().map(Net::len).sum()
    }
}

/// Pin count a component needs for `pin` to be in range.
fn pins_needed(pin: &PinId) -> u32 {
    match pin.designator() {
        PinDesignator::Single => 1,
        PinDesignator::Number(n) => n,
        PinDesignator::Tab => 0,
    }
}

/// Whether going from `old` to `new` pins changes how pin 1 is written.
fn crosses_single(old: u32, new: u32) -> bool {
    (old == 1) != (new == 1)
}

/// Rewrite `pin` for the pin counts a pending plan will set.
fn planned(pin: &PinId, plan: &BTreeMap<String, u32>) -> PinId {
    match plan.get(pin.reference()) {
        Some(&count) => pin.recanonicalized(count),
        None => pin.clone(),
    }
}

/// One reverse-engineering project held in memory.
#[derive(Debug, Clone)]
pub struct Project {
    name: String,
    settings: Settings,
    registry: PinRegistry,
    components: ComponentStore,
    connections: ConnectionStore,
    nets: NetBuilder,
    names: NetNameRegistry,
}

impl Project {
    pub fn new(name: impl Into<String>, settings: Settings) -> Self {
        Self {
            name: name.into(),
            registry: PinRegistry::new(&settings),
            settings,
            components: ComponentStore::default(),
            connections: ConnectionStore::default(),
            nets: NetBuilder::new(),
            names: NetNameRegistry::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &PinRegistry {
        &self.registry
    }

    pub fn components(&self) -> &ComponentStore {
        &self.components
    }

    pub fn connections(&self) -> &ConnectionStore {
        &self.connections
    }

    pub fn net_names(&self) -> &NetNameRegistry {
        &self.names
    }

    pub fn canonicalize(&self, text: &str) -> Result<PinId> {
        self.registry.canonicalize(text, &self.components)
    }

    // ==================== Connections ====================

    /// Record that pins `a` and `b` are electrically connected.
    pub fn add_connection(&mut self, a: &str, b: &str) -> Result<Added> {
        let a = self.canonicalize(a)?;
        let b = self.canonicalize(b)?;

        let mut plan = BTreeMap::new();
        self.plan_pin(&a, &mut plan)?;
        self.plan_pin(&b, &mut plan)?;
        let connection = Connection::new(planned(&a, &plan), planned(&b, &plan))?;

        let created = self.apply_plan(plan);
        let new = self
            .connections
            .add(connection.a().clone(), connection.b().clone())?;
        if new {
            self.nets.connect(connection.a(), connection.b());
            tracing::debug!("Connected {}", connection);
        }
        Ok(Added {
            connection,
            new,
            created,
        })
    }

    /// Remove exactly the connection `a`-`b`.
    pub fn delete_edge(&mut self, a: &str, b: &str) -> Result<()> {
        let a = self.canonicalize(a)?;
        let b = self.canonicalize(b)?;
        self.restructure(|connections| connections.delete_edge(&a, &b))?;
        tracing::debug!("Disconnected {} <-> {}", a, b);
        Ok(())
    }

    /// Remove every connection of `pin`. Zero is a valid answer.
    pub fn delete_by_pin(&mut self, pin: &str) -> Result<usize> {
        let pin = self.canonicalize(pin)?;
        if !self.connections.has_pin(&pin) {
            return Ok(0);
        }
        let removed = self.restructure(|connections| Ok(connections.delete_by_pin(&pin)))?;
        tracing::debug!("Removed {} connections of {}", removed, pin);
        Ok(removed)
    }

    /// Move every connection of `from` onto `to` (e.g. a tab that is the
    /// same metal as a numbered pin). A second call finds nothing to move.
    pub fn merge_pins(&mut self, from: &str, to: &str) -> Result<MergeOutcome> {
        let from = self.canonicalize(from)?;
        let to = self.canonicalize(to)?;
        if from == to {
            return Err(ProbeError::SelfMerge {
                pin: from.to_string(),
            });
        }

        let mut plan = BTreeMap::new();
        self.plan_pin(&to, &mut plan)?;
        if !self.connections.has_pin(&from) {
            return Ok(MergeOutcome::default());
        }

        let (from, to) = (planned(&from, &plan), planned(&to, &plan));
        self.apply_plan(plan);
        let outcome = self.restructure(|connections| connections.merge_pins(&from, &to))?;
        tracing::info!(
            "Merged {} into {}: {} moved, {} dropped",
            from,
            to,
            outcome.moved,
            outcome.dropped
        );
        Ok(outcome)
    }

    /// Connections touching a pin, or any pin of a bare reference.
    pub fn find(&self, text: &str) -> Result<Vec<Connection>> {
        let parsed = self.registry.parse(text)?;
        if parsed.designator.is_none() {
            let reference = parsed.reference.as_str();
            return Ok(self
                .connections
                .iter()
                .filter(|c| c.a().reference() == reference || c.b().reference() == reference)
                .cloned()
                .collect());
        }
        let pin = self.canonicalize(text)?;
        Ok(self.connections.edges_of(&pin).cloned().collect())
    }

    /// Numbered pins of multi-pin components with no connection yet.
    pub fn remaining(&self, prefix: Option<&str>) -> Vec<RemainingPins> {
        let prefix = prefix.map(str::to_uppercase);
        let connected = self.connections.pins();
        self.components
            .iter()
            .filter(|(_, component)| component.pins > 1)
            .filter(|(reference, _)| match &prefix {
                Some(prefix) => reference.to_uppercase().starts_with(prefix.as_str()),
                None => true,
            })
            .filter_map(|(reference, component)| {
                let pins: Vec<u32> = (1..=component.pins)
                    .filter(|n| !connected.contains(&PinId::numbered(reference, *n)))
                    .collect();
                (!pins.is_empty()).then(|| RemainingPins {
                    reference: reference.to_string(),
                    value: component.display_value().to_string(),
                    pins,
                })
            })
            .collect()
    }

    // ==================== Nets ====================

    /// Every net, ordered by representative.
    pub fn nets(&self) -> Vec<Net> {
        match self.nets.current() {
            Some(nets) => nets,
            None => NetBuilder::from_connections(&self.connections)
                .current()
                .unwrap_or_default(),
        }
    }

    pub fn net_of(&self, pin: &PinId) -> Option<Net> {
        self.nets().into_iter().find(|net| net.contains(pin))
    }

    /// Nets with names resolved. Conflicts are logged and returned.
    pub fn netlist(&self) -> Netlist {
        let nets = self.nets();
        let names = self.names.resolve(&nets);
        Netlist { nets, names }
    }

    /// Name the net containing `pin`. Returns that net.
    pub fn name_net(&mut self, pin: &str, name: &str) -> Result<Net> {
        let pin = self.canonicalize(pin)?;
        let net = self
            .net_of(&pin)
            .ok_or_else(|| ProbeError::PinNotConnected {
                pin: pin.to_string(),
            })?;
        for replaced in self.names.assign(&net, name) {
            if replaced.name != name {
                tracing::info!("Replaced net name {}", replaced);
            }
        }
        tracing::info!("Named net {} ({} pins)", name, net.len());
        Ok(net)
    }

    // ==================== Components ====================

    /// Add a component, replacing any existing record for `reference`.
    pub fn add_component(
        &mut self,
        reference: &str,
        pins: Option<u32>,
        value: Option<&str>,
        package: Option<&str>,
    ) -> Result<&Component> {
        if pins == Some(0) {
            return Err(ValueError::InvalidValue {
                input: "0".to_string(),
                reason: "pin count must be a positive integer".to_string(),
            }
            .into());
        }
        let reference = self.component_reference(reference)?;
        let mut component = Component::new(&reference);
        if let Some(pins) = pins {
            component = component.with_pins(pins);
        }
        if let Some(value) = value {
            component = component.with_value(value)?;
        }
        if let Some(package) = package {
            component = component.with_package(package);
        }
        self.check_pin_count(&reference, component.pins)?;

        let count = component.pins;
        let previous = self.components.insert(&reference, component);
        match previous {
            Some(old) => {
                tracing::info!("Replaced component {}", reference);
                if crosses_single(old.pins, count) {
                    self.recanonicalize(&reference, count);
                }
            }
            None => tracing::info!("Added component {} ({} pins)", reference, count),
        }
        self.component(&reference)
    }

    pub fn edit_component(&mut self, reference: &str, field: ComponentField, value: &str) -> Result<()> {
        let reference = self.registry.normalize_reference(reference);
        let kind = self.component(&reference)?.kind;
        match field {
            ComponentField::Pins => {
                let count = value
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n >= 1)
                    .ok_or_else(|| ValueError::InvalidValue {
                        input: value.to_string(),
                        reason: "pin count must be a positive integer".to_string(),
                    })?;
                self.set_pin_count(&reference, count)?;
            }
            ComponentField::Value => {
                let normalized = normalize_value(kind, value)?;
                self.component_mut(&reference)?.value = normalized;
            }
            ComponentField::Package => {
                self.component_mut(&reference)?.package = value.trim().to_string();
            }
            ComponentField::Description => {
                self.component_mut(&reference)?.description = value.trim().to_string();
            }
        }
        tracing::debug!("Edited {}.{:?} = {}", reference, field, value);
        Ok(())
    }

    /// Change a pin count. Fails if a connected pin would fall outside it.
    pub fn set_pin_count(&mut self, reference: &str, count: u32) -> Result<()> {
        let reference = self.registry.normalize_reference(reference);
        let old = self.component(&reference)?.pins;
        self.check_pin_count(&reference, count)?;

        let component = self.component_mut(&reference)?;
        component.pins = count;
        component.inferred = false;
        if crosses_single(old, count) {
            self.recanonicalize(&reference, count);
        }
        Ok(())
    }

    /// Delete a component and every connection of its pins.
    pub fn delete_component(&mut self, reference: &str) -> Result<usize> {
        let reference = self.registry.normalize_reference(reference);
        self.component(&reference)?;
        let removed =
            self.restructure(|connections| Ok(connections.delete_by_reference(&reference)))?;
        self.components.remove(&reference);
        tracing::info!("Deleted {} and {} connections", reference, removed);
        Ok(removed)
    }

    /// Record a measurement on an existing component.
    pub fn measure(&mut self, reference: &str, kind: MeasurementKind, text: &str) -> Result<String> {
        let reference = self.registry.normalize_reference(reference);
        self.component_mut(&reference)?.record(kind, text)
    }

    /// Record a measurement whose kind follows from the component kind,
    /// creating the component if it does not exist yet.
    pub fn quick_measure(&mut self, reference: &str, text: &str) -> Result<String> {
        let reference = self.registry.normalize_reference(reference);
        if let Some(component) = self.components.get_mut(&reference) {
            let kind = component.quick_kind(text);
            return component.record(kind, text);
        }

        let reference = self.component_reference(&reference)?;
        let mut component = Component::new(&reference);
        let kind = component.quick_kind(text);
        let line = component.record(kind, text)?;
        self.components.insert(&reference, component);
        tracing::info!("Added component {} for measurement", reference);
        Ok(line)
    }

    // ==================== Reports ====================

    pub fn stats(&self) -> ProjectStats {
        let netlist = self.netlist();
        let mut by_prefix = BTreeMap::new();
        for (reference, _) in self.components.iter() {
            let prefix: String = reference.chars().filter(|c| c.is_alphabetic()).collect();
            *by_prefix.entry(prefix).or_insert(0) += 1;
        }
        ProjectStats {
            components: self.components.len(),
            connections: self.connections.len(),
            nets: netlist.nets.len(),
            named_nets: netlist.names.names.len(),
            measured: self
                .components
                .iter()
                .filter(|(_, c)| !c.measured.is_empty())
                .count(),
            by_prefix,
        }
    }

    /// Check the derived nets against a plain graph traversal and every
    /// connected pin against its component.
    pub fn verify(&self) -> Result<()> {
        let derived: Vec<BTreeSet<PinId>> =
            self.nets().into_iter().map(|net| net.members().clone()).collect();
        let expected = audit::reference_nets(&self.connections);
        if derived != expected {
            let missing = expected.iter().find(|net| !derived.contains(net));
            return Err(ProbeError::Inconsistent {
                message: match missing.and_then(|net| net.first()) {
                    Some(pin) => format!(
                        "{} nets derived, {} by traversal; net of {} differs",
                        derived.len(),
                        expected.len(),
                        pin
                    ),
                    None => format!("{} nets derived, {} by traversal", derived.len(), expected.len()),
                },
            });
        }

        for pin in self.connections.pins() {
            let count = self.components.pin_count(pin.reference()).ok_or_else(|| {
                ProbeError::Inconsistent {
                    message: format!("{} has no component record", pin),
                }
            })?;
            if pins_needed(pin) > count {
                return Err(ProbeError::Inconsistent {
                    message: format!("{} is beyond {}'s {} pins", pin, pin.reference(), count),
                });
            }
        }
        Ok(())
    }

    // ==================== Internals ====================

    fn component(&self, reference: &str) -> Result<&Component> {
        self.components
            .get(reference)
            .ok_or_else(|| ProbeError::UnknownComponent {
                reference: reference.to_string(),
            })
    }

    fn component_mut(&mut self, reference: &str) -> Result<&mut Component> {
        self.components
            .get_mut(reference)
            .ok_or_else(|| ProbeError::UnknownComponent {
                reference: reference.to_string(),
            })
    }

    /// Normalized reference for a new component; pin syntax is rejected.
    fn component_reference(&self, text: &str) -> Result<String> {
        let parsed = self.registry.parse(text)?;
        if parsed.designator.is_some() {
            return Err(ProbeError::malformed_pin(
                text,
                "a component reference cannot name a pin",
            ));
        }
        Ok(parsed.reference)
    }

    /// Work out which components `pin` needs created or grown.
    fn plan_pin(&self, pin: &PinId, plan: &mut BTreeMap<String, u32>) -> Result<()> {
        let reference = pin.reference();
        let needed = pins_needed(pin);
        let target = match self.components.get(reference) {
            Some(component) if needed <= component.pins => return Ok(()),
            Some(component) if component.inferred => needed,
            Some(component) => {
                return Err(ProbeError::PinIndexOutOfRange {
                    pin: pin.to_string(),
                    reference: reference.to_string(),
                    pin_count: component.pins,
                })
            }
            None if !self.settings.implicit_components => {
                return Err(ProbeError::UnknownComponent {
                    reference: reference.to_string(),
                })
            }
            None => match pin.designator() {
                PinDesignator::Single => 1,
                _ => needed.max(Component::new(reference).pins),
            },
        };
        let entry = plan.entry(reference.to_string()).or_insert(target);
        *entry = (*entry).max(target);
        Ok(())
    }

    /// Create or grow the planned components. Returns the created references.
    fn apply_plan(&mut self, plan: BTreeMap<String, u32>) -> Vec<String> {
        let mut created = Vec::new();
        for (reference, count) in plan {
            let old = match self.components.get_mut(&reference) {
                Some(component) => {
                    let old = component.pins;
                    component.pins = count;
                    old
                }
                None => {
                    let mut component = Component::new(&reference).with_pins(count);
                    component.inferred = true;
                    self.components.insert(&reference, component);
                    tracing::info!("Created component {} ({} pins)", reference, count);
                    created.push(reference);
                    continue;
                }
            };
            tracing::info!("{} now has {} pins", reference, count);
            if crosses_single(old, count) {
                self.recanonicalize(&reference, count);
            }
        }
        created
    }

    /// Rewrite stored pins of `reference` for a new pin count.
    fn recanonicalize(&mut self, reference: &str, pin_count: u32) {
        let rename = |pin: &PinId| {
            if pin.reference() == reference {
                pin.recanonicalized(pin_count)
            } else {
                pin.clone()
            }
        };
        self.connections.rename_pins(rename);
        self.names.rename_pins(rename);
        self.nets.invalidate();
        self.nets.refresh(&self.connections);
        tracing::debug!("Re-canonicalized pins of {} for {} pins", reference, pin_count);
    }

    fn check_pin_count(&self, reference: &str, count: u32) -> Result<()> {
        let beyond = self
            .connections
            .pins()
            .into_iter()
            .find(|pin| pin.reference() == reference && pins_needed(pin) > count);
        match beyond {
            Some(pin) => Err(ProbeError::PinIndexOutOfRange {
                pin: pin.to_string(),
                reference: reference.to_string(),
                pin_count: count,
            }),
            None => Ok(()),
        }
    }

    /// Apply a destructive edge change, rebuild the nets and rehome name
    /// bindings. Nothing happens if `change` fails.
    fn restructure<T>(
        &mut self,
        change: impl FnOnce(&mut ConnectionStore) -> Result<T>,
    ) -> Result<T> {
        let previous = if self.names.is_empty() {
            Vec::new()
        } else {
            self.nets()
        };
        let outcome = change(&mut self.connections)?;
        self.nets.invalidate();
        let current = self.nets.nets(&self.connections);
        self.names.rehome(&previous, &current);
        Ok(outcome)
    }

    /// Install loaded state. Pins referencing missing or too-small
    /// components are repaired by creating or growing them.
    pub(crate) fn restore(
        &mut self,
        components: ComponentStore,
        edges: Vec<(PinId, PinId)>,
        bindings: Vec<(PinId, String)>,
    ) {
        self.components = components;

        let mut plan: BTreeMap<String, u32> = BTreeMap::new();
        let pins = edges
            .iter()
            .flat_map(|(a, b)| [a, b])
            .chain(bindings.iter().map(|(pin, _)| pin));
        for pin in pins {
            let needed = pins_needed(pin).max(1);
            let target = match self.components.pin_count(pin.reference()) {
                Some(count) if needed <= count => continue,
                Some(_) => needed,
                None if pin.designator() == PinDesignator::Single => 1,
                None => needed.max(Component::new(pin.reference()).pins),
            };
            let entry = plan.entry(pin.reference().to_string()).or_insert(target);
            *entry = (*entry).max(target);
        }
        for (reference, count) in &plan {
            match self.components.get_mut(reference) {
                Some(component) => {
                    tracing::warn!("{} grown to {} pins to fit saved connections", reference, count);
                    component.pins = *count;
                }
                None => {
                    tracing::warn!("{} missing from saved components; created", reference);
                    let mut component = Component::new(reference).with_pins(*count);
                    component.inferred = true;
                    self.components.insert(reference, component);
                }
            }
        }

        let settle = |pin: &PinId| match self.components.pin_count(pin.reference()) {
            Some(count) => pin.recanonicalized(count),
            None => pin.clone(),
        };
        let mut connections = ConnectionStore::default();
        for (a, b) in &edges {
            if let Err(e) = connections.add(settle(a), settle(b)) {
                tracing::warn!("Skipping saved connection: {}", e);
            }
        }
        let mut names = NetNameRegistry::new();
        for (pin, name) in bindings {
            names.insert_raw(settle(&pin), name);
        }

        self.connections = connections;
        self.names = names;
        self.nets = NetBuilder::from_connections(&self.connections);
        let current = self.nets();
        self.names.rehome(&[], &current);
    }
}
