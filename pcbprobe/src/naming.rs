//! User-assigned net names.
//!
//! A name is bound to a pin, not to a net: nets are recomputed all the time,
//! pins are stable. Resolution scans each net's members in canonical order and
//! takes the first binding it meets. When a merge brings two differently named
//! pins into one net, the lower pin's name wins and the other is reported as a
//! [`NameConflict`]; the losing binding is kept so that a later split gives
//! both nets their names back.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::nets::Net;
use crate::pin::PinId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameBinding {
    pub pin: PinId,
    pub name: String,
}

impl fmt::Display for NameBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' (on {})", self.name, self.pin)
    }
}

/// Two or more names found on one net. Not an error: `kept` is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameConflict {
    /// Representative of the net
    pub net: PinId,
    pub kept: NameBinding,
    pub discarded: Vec<NameBinding>,
}

impl fmt::Display for NameConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let discarded: Vec<String> = self.discarded.iter().map(|b| b.to_string()).collect();
        write!(
            f,
            "net {} has several names: using {}, ignoring {}",
            self.net,
            self.kept,
            discarded.join(", ")
        )
    }
}

/// Names for a set of nets, keyed by net representative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub names: BTreeMap<PinId, String>,
    pub conflicts: Vec<NameConflict>,
}

impl Resolution {
    pub fn name_of(&self, net: &Net) -> Option<&str> {
        self.names.get(net.representative()).map(String::as_str)
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Bindings that moved or vanished after a destructive change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rehomed {
    /// (old pin, new pin, name)
    pub moved: Vec<(PinId, PinId, String)>,
    pub dropped: Vec<NameBinding>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetNameRegistry {
    bindings: BTreeMap<PinId, String>,
}

impl NetNameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name `net`. Any other name on its members is replaced, and `name` is
    /// taken away from whichever net held it before. Returns the bindings
    /// that were removed.
    pub fn assign(&mut self, net: &Net, name: &str) -> Vec<NameBinding> {
        let mut removed = Vec::new();
        self.bindings.retain(|pin, bound| {
            let stale = net.contains(pin) || bound == name;
            if stale {
                removed.push(NameBinding {
                    pin: pin.clone(),
                    name: bound.clone(),
                });
            }
            !stale
        });
        self.bindings
            .insert(net.representative().clone(), name.to_string());
        removed
    }

    /// Name of `net` plus the conflict, if its members carry different names.
    pub fn resolve_net(&self, net: &Net) -> (Option<String>, Option<NameConflict>) {
        let mut found = net
            .members()
            .iter()
            .filter_map(|pin| self.bindings.get(pin).map(|name| (pin, name)));
        let Some((kept_pin, kept_name)) = found.next() else {
            return (None, None);
        };
        let discarded: Vec<NameBinding> = found
            .filter(|(_, name)| *name != kept_name)
            .map(|(pin, name)| NameBinding {
                pin: pin.clone(),
                name: name.clone(),
            })
            .collect();

        let conflict = (!discarded.is_empty()).then(|| NameConflict {
            net: net.representative().clone(),
            kept: NameBinding {
                pin: kept_pin.clone(),
                name: kept_name.clone(),
            },
            discarded,
        });
        (Some(kept_name.clone()), conflict)
    }

    /// Resolve names for every net in `nets`.
    pub fn resolve(&self, nets: &[Net]) -> Resolution {
        let mut resolution = Resolution::default();
        for net in nets {
            let (name, conflict) = self.resolve_net(net);
            if let Some(name) = name {
                resolution.names.insert(net.representative().clone(), name);
            }
            if let Some(conflict) = conflict {
                tracing::warn!("{}", conflict);
                resolution.conflicts.push(conflict);
            }
        }
        resolution
    }

    /// Keep bindings attached after pins left the edge set.
    ///
    /// `previous` are the nets before the change, `current` after it. A
    /// binding whose pin is no longer in any net moves to a surviving member
    /// of its old net. The name that won its old net takes the lowest
    /// survivor, pushing any binding held there to the next free survivor,
    /// so the net keeps its resolved name. Other names take the lowest free
    /// survivor. A binding is dropped only when no survivor can hold it.
    pub fn rehome(&mut self, previous: &[Net], current: &[Net]) -> Rehomed {
        let alive: BTreeSet<&PinId> = current.iter().flat_map(|n| n.members()).collect();
        let winners: BTreeSet<PinId> = previous
            .iter()
            .filter_map(|net| net.members().iter().find(|m| self.bindings.contains_key(*m)))
            .cloned()
            .collect();
        let orphans: Vec<(PinId, String)> = self
            .bindings
            .iter()
            .filter(|(pin, _)| !alive.contains(pin))
            .map(|(pin, name)| (pin.clone(), name.clone()))
            .collect();

        let mut report = Rehomed::default();
        for (pin, name) in orphans {
            self.bindings.remove(&pin);
            let survivors: Vec<PinId> = previous
                .iter()
                .find(|net| net.contains(&pin))
                .map(|net| {
                    net.members()
                        .iter()
                        .filter(|m| alive.contains(m))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();

            match survivors.first() {
                Some(heir) if winners.contains(&pin) => {
                    let heir = heir.clone();
                    tracing::info!("Net name '{}' moved from {} to {}", name, pin, heir);
                    let displaced = self.bindings.insert(heir.clone(), name.clone());
                    report.moved.push((pin, heir.clone(), name.clone()));
                    if let Some(displaced) = displaced.filter(|d| *d != name) {
                        self.place(&survivors, heir, displaced, &mut report);
                    }
                }
                _ => self.place(&survivors, pin, name, &mut report),
            }
        }
        report
    }

    /// Bind `name`, last held by `from`, to the lowest unbound pin of
    /// `survivors`, or drop it when every survivor is taken.
    fn place(&mut self, survivors: &[PinId], from: PinId, name: String, report: &mut Rehomed) {
        match survivors.iter().find(|m| !self.bindings.contains_key(*m)) {
            Some(free) => {
                tracing::info!("Net name '{}' moved from {} to {}", name, from, free);
                self.bindings.insert(free.clone(), name.clone());
                report.moved.push((from, free.clone(), name));
            }
            None => {
                tracing::info!("Net name '{}' dropped: no pin of its net is left", name);
                report.dropped.push(NameBinding { pin: from, name });
            }
        }
    }

    /// Rewrite bound pins through `rename` (pin re-canonicalization).
    pub(crate) fn rename_pins(&mut self, rename: impl Fn(&PinId) -> PinId) {
        self.bindings = std::mem::take(&mut self.bindings)
            .into_iter()
            .map(|(pin, name)| (rename(&pin), name))
            .collect();
    }

    /// Bind without any cleanup; used when loading saved state.
    pub(crate) fn insert_raw(&mut self, pin: PinId, name: String) {
        self.bindings.insert(pin, name);
    }

    pub fn get(&self, pin: &PinId) -> Option<&str> {
        self.bindings.get(pin).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PinId, &str)> {
        self.bindings.iter().map(|(p, n)| (p, n.as_str()))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(text: &str) -> PinId {
        match text.split_once('-') {
            Some((r, n)) => PinId::numbered(r, n.parse().unwrap()),
            None => PinId::single(text),
        }
    }

    fn net(pins: &[&str]) -> Net {
        Net::new(pins.iter().map(|p| pin(p)).collect()).unwrap()
    }

    #[test]
    fn test_assign_and_resolve() {
        let mut registry = NetNameRegistry::new();
        let power = net(&["U1-8", "C1-1"]);
        registry.assign(&power, "VCC");

        assert_eq!(registry.get(&pin("C1-1")), Some("VCC"));
        let resolution = registry.resolve(&[power.clone(), net(&["R1-1", "R2-1"])]);
        assert_eq!(resolution.name_of(&power), Some("VCC"));
        assert_eq!(resolution.names.len(), 1);
        assert!(!resolution.has_conflicts());
    }

    #[test]
    fn test_rename_replaces_member_bindings() {
        let mut registry = NetNameRegistry::new();
        registry.insert_raw(pin("U1-8"), "V3".to_string());
        let power = net(&["U1-8", "C1-1"]);
        let removed = registry.assign(&power, "VCC");
        assert_eq!(removed.len(), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve_net(&power).0.as_deref(), Some("VCC"));
    }

    #[test]
    fn test_name_moves_between_nets() {
        let mut registry = NetNameRegistry::new();
        let a = net(&["R1-1", "R2-1"]);
        let b = net(&["R3-1", "R4-1"]);
        registry.assign(&a, "SIG");
        registry.assign(&b, "SIG");
        assert_eq!(registry.resolve_net(&a).0, None);
        assert_eq!(registry.resolve_net(&b).0.as_deref(), Some("SIG"));
    }

    #[test]
    fn test_conflict_keeps_lowest_pin() {
        let mut registry = NetNameRegistry::new();
        registry.assign(&net(&["R2-1", "C5-1"]), "GND2");
        registry.assign(&net(&["R1-1", "C9-1"]), "GND1");

        let merged = net(&["R2-1", "C5-1", "R1-1", "C9-1"]);
        let resolution = registry.resolve(std::slice::from_ref(&merged));
        // C5-1 < C9-1, so GND2 (bound on C5-1) wins
        assert_eq!(resolution.name_of(&merged), Some("GND2"));
        assert_eq!(resolution.conflicts.len(), 1);
        let conflict = &resolution.conflicts[0];
        assert_eq!(conflict.kept.pin, pin("C5-1"));
        assert_eq!(conflict.discarded[0].name, "GND1");
        // both bindings survive resolution
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_same_name_twice_is_not_a_conflict() {
        let mut registry = NetNameRegistry::new();
        registry.insert_raw(pin("A-1"), "X".to_string());
        registry.insert_raw(pin("B-1"), "X".to_string());
        let (name, conflict) = registry.resolve_net(&net(&["A-1", "B-1"]));
        assert_eq!(name.as_deref(), Some("X"));
        assert!(conflict.is_none());
    }

    #[test]
    fn test_rehome() {
        let mut registry = NetNameRegistry::new();
        let before = vec![net(&["A-1", "B-1", "C-1"]), net(&["X-1", "Y-1"])];
        registry.assign(&before[0], "N1");
        registry.assign(&before[1], "N2");

        // A-1 and both of X/Y lost their connections
        let after = vec![net(&["B-1", "C-1"])];
        let report = registry.rehome(&before, &after);
        assert_eq!(report.moved, [(pin("A-1"), pin("B-1"), "N1".to_string())]);
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(registry.get(&pin("B-1")), Some("N1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_rehome_keeps_winning_name() {
        let mut registry = NetNameRegistry::new();
        let joined = vec![net(&["C1-1", "C2-1", "R1-1", "R2-1"])];
        registry.insert_raw(pin("C1-1"), "GND1".to_string());
        registry.insert_raw(pin("C2-1"), "GND2".to_string());
        assert_eq!(registry.resolve(&joined).name_of(&joined[0]), Some("GND1"));

        let after = vec![net(&["C2-1", "R1-1", "R2-1"])];
        let report = registry.rehome(&joined, &after);
        assert!(report.dropped.is_empty());
        assert_eq!(registry.get(&pin("C2-1")), Some("GND1"));
        assert_eq!(registry.get(&pin("R1-1")), Some("GND2"));
        assert_eq!(registry.resolve(&after).name_of(&after[0]), Some("GND1"));
    }

    #[test]
    fn test_rehome_drops_when_no_pin_is_free() {
        let mut registry = NetNameRegistry::new();
        let before = vec![net(&["A-1", "B-1", "C-1"])];
        registry.insert_raw(pin("A-1"), "N1".to_string());
        registry.insert_raw(pin("B-1"), "N2".to_string());
        registry.insert_raw(pin("C-1"), "N3".to_string());

        // A-1 left; its winning name takes B-1, N2 has nowhere to go
        let after = vec![net(&["B-1", "C-1"])];
        let report = registry.rehome(&before, &after);
        assert_eq!(registry.get(&pin("B-1")), Some("N1"));
        assert_eq!(registry.get(&pin("C-1")), Some("N3"));
        assert_eq!(report.dropped, [NameBinding { pin: pin("B-1"), name: "N2".to_string() }]);
    }
}
