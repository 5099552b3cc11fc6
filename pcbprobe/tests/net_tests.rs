//! Net derivation tests against the graph-traversal audit

use std::collections::BTreeSet;

use pcbprobe::audit::reference_nets;
use pcbprobe::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn partition(project: &Project) -> Vec<BTreeSet<PinId>> {
    project.nets().into_iter().map(|n| n.members().clone()).collect()
}

fn sizes(project: &Project) -> Vec<usize> {
    let mut sizes: Vec<usize> = project.nets().iter().map(Net::len).collect();
    sizes.sort();
    sizes
}

fn random_pin(rng: &mut StdRng) -> String {
    match rng.gen_range(0..10) {
        0 => format!("TP{}", rng.gen_range(1..=3)),
        1 => format!("Q{}-TAB", rng.gen_range(1..=2)),
        2..=4 => format!("U{}-{}", rng.gen_range(1..=2), rng.gen_range(1..=8)),
        _ => format!("R{}-{}", rng.gen_range(1..=6), rng.gen_range(1..=2)),
    }
}

#[test]
fn test_random_operations_match_traversal() {
    for seed in [1u64, 7, 42, 1234] {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut project = Project::new("fuzz", Settings::default());

        for step in 0..400 {
            let before: Vec<Connection> = project.connections().iter().cloned().collect();
            let result = match rng.gen_range(0..100) {
                0..=59 => {
                    let (a, b) = (random_pin(&mut rng), random_pin(&mut rng));
                    project.add_connection(&a, &b).map(|_| ())
                }
                60..=74 => match before.get(rng.gen_range(0..before.len().max(1))) {
                    Some(edge) => project.delete_edge(&edge.a().to_string(), &edge.b().to_string()),
                    None => Ok(()),
                },
                75..=84 => project.delete_by_pin(&random_pin(&mut rng)).map(|_| ()),
                85..=94 => {
                    let (a, b) = (random_pin(&mut rng), random_pin(&mut rng));
                    project.merge_pins(&a, &b).map(|_| ())
                }
                _ => {
                    let pin = random_pin(&mut rng);
                    project.name_net(&pin, &format!("N{step}")).map(|_| ())
                }
            };

            if result.is_err() {
                let after: Vec<Connection> = project.connections().iter().cloned().collect();
                assert_eq!(before, after, "seed {seed} step {step}: failed op mutated edges");
            }
            assert_eq!(
                partition(&project),
                reference_nets(project.connections()),
                "seed {seed} step {step}"
            );
        }
        project.verify().unwrap();
    }
}

#[test]
fn test_scenario_three_nets_then_join() {
    let mut project = Project::new("scenario", Settings::default());
    project.add_connection("R01-1", "VCC-1").unwrap();
    project.add_connection("R01-2", "U01-5").unwrap();
    project.add_connection("C01-1", "GND-1").unwrap();
    assert_eq!(sizes(&project), [2, 2, 2]);

    project.add_connection("VCC-1", "C01-1").unwrap();
    assert_eq!(sizes(&project), [2, 4]);
    assert_eq!(partition(&project), reference_nets(project.connections()));
}

#[test]
fn test_add_then_delete_round_trip() {
    let mut project = Project::new("roundtrip", Settings::default());
    project.add_connection("U1-1", "R1-1").unwrap();
    project.add_connection("U1-2", "R2-1").unwrap();
    project.name_net("U1-1", "IN").unwrap();
    project.name_net("U1-2", "OUT").unwrap();
    let before = partition(&project);

    project.add_connection("R1-1", "R2-1").unwrap();
    project.delete_edge("R2-1", "R1-1").unwrap();

    assert_eq!(partition(&project), before);
    let netlist = project.netlist();
    assert!(netlist.conflicts().is_empty());
    let names: BTreeSet<&str> = netlist.nets.iter().filter_map(|n| netlist.name_of(n)).collect();
    assert_eq!(names, BTreeSet::from(["IN", "OUT"]));
}

#[test]
fn test_merge_twice_is_noop() {
    let mut project = Project::new("merge", Settings::default());
    project.add_component("Q14", Some(4), None, Some("TO-220")).unwrap();
    project.add_connection("Q14-4", "C7-1").unwrap();
    project.add_connection("Q14-4", "L1-2").unwrap();
    project.add_connection("Q14-TAB", "L1-2").unwrap();

    project.merge_pins("Q14-4", "Q14-TAB").unwrap();
    let once: Vec<Connection> = project.connections().iter().cloned().collect();
    project.merge_pins("Q14-4", "Q14-TAB").unwrap();
    let twice: Vec<Connection> = project.connections().iter().cloned().collect();

    assert_eq!(once, twice);
    assert_eq!(once.len(), 2);
    assert!(project.find("Q14-4").unwrap().is_empty());
}

#[test]
fn test_naming_conflict_resolves_to_lowest_pin() {
    let mut project = Project::new("names", Settings::default());
    project.add_connection("C2-2", "J1-1").unwrap();
    project.add_connection("C1-2", "J2-1").unwrap();
    project.name_net("J1-1", "GND1").unwrap();
    project.name_net("J2-1", "GND2").unwrap();

    project.add_connection("J1-1", "J2-1").unwrap();
    let netlist = project.netlist();
    assert_eq!(netlist.nets.len(), 1);
    // GND2 sits on C1-2, which sorts before GND1's C2-2
    assert_eq!(netlist.name_of(&netlist.nets[0]), Some("GND2"));

    let conflict = &netlist.conflicts()[0];
    assert_eq!(conflict.kept.name, "GND2");
    assert_eq!(conflict.discarded[0].name, "GND1");
    assert_eq!(conflict.discarded[0].pin.to_string(), "C2-2");

    // renaming the joined net clears the conflict
    project.name_net("J1-1", "GND").unwrap();
    assert!(project.netlist().conflicts().is_empty());
}

#[test]
fn test_delete_by_pin_zero_edges() {
    let mut project = Project::new("zero", Settings::default());
    project.add_connection("R1-1", "R2-1").unwrap();
    let before = partition(&project);

    assert_eq!(project.delete_by_pin("R3-2").unwrap(), 0);
    assert_eq!(project.delete_by_pin("R1-2").unwrap(), 0);
    assert_eq!(partition(&project), before);
}

#[test]
fn test_malformed_pins_rejected_everywhere() {
    let mut project = Project::new("bad", Settings::default());
    project.add_connection("R1-1", "R2-1").unwrap();

    for bad in ["R1-0", "R1-x", "-3", "R1-"] {
        assert!(matches!(project.add_connection(bad, "R2-2"), Err(ProbeError::MalformedPin { .. })));
        assert!(matches!(project.delete_by_pin(bad), Err(ProbeError::MalformedPin { .. })));
        assert!(matches!(project.name_net(bad, "X"), Err(ProbeError::MalformedPin { .. })));
    }
    assert!(matches!(
        project.add_connection("R1-1", "R1-1"),
        Err(ProbeError::SelfConnection { .. })
    ));
    assert!(matches!(
        project.delete_edge("R1-1", "R2-2"),
        Err(ProbeError::EdgeNotFound { .. })
    ));
    assert_eq!(project.connections().len(), 1);
}
