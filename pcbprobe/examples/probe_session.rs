//! Probe session example: record a few connections, name nets, export.

use pcbprobe::export::export;
use pcbprobe::prelude::*;
use std::path::PathBuf;

fn main() -> Result<(), ProbeError> {
    let dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("pcbprobe-demo"));

    let files = ProjectFiles::new(&dir, "demo");
    let mut project = files.load(Settings::default())?;

    project.add_component("U1", Some(8), None, Some("SOIC-8"))?;
    project.add_connection("U1-8", "C1-1")?;
    project.add_connection("C1-1", "R1-1")?;
    project.add_connection("U1-4", "C1-2")?;
    project.add_connection("C1-2", "GND")?;
    project.name_net("U1-8", "VCC")?;
    project.name_net("GND", "GND")?;
    project.quick_measure("R1", "10k")?;

    let netlist = project.netlist();
    println!("{} nets:", netlist.nets.len());
    for net in &netlist.nets {
        let pins: Vec<String> = net.members().iter().map(|p| p.to_string()).collect();
        println!(
            "  {:<8} {}",
            netlist.name_of(net).unwrap_or("-"),
            pins.join(", ")
        );
    }

    let remaining = project.remaining(None);
    if !remaining.is_empty() {
        println!("\nUnprobed pins:");
        for entry in remaining {
            println!("  {} ({}): {:?}", entry.reference, entry.value, entry.pins);
        }
    }

    files.save(&project)?;
    let path = export(&project, ExportKind::Kicad, &dir)?;
    println!("\nSaved to {}, netlist at {}", dir.display(), path.display());
    Ok(())
}
