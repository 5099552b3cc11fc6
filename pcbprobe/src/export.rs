//! Export formats: BOM, connection list, component list, named nets and a
//! KiCad netlist.
//!
//! Every writer takes a [`Project`] and any `io::Write`; [`export`] wraps
//! them with the conventional file names inside the project directory.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{ProbeError, Result};
use crate::naming::NameConflict;
use crate::nets::Net;
use crate::project::Project;

/// Packages that mark a component as not a real part (nets, jumpers drawn
/// for bookkeeping).
const NON_BOM_PACKAGES: [&str; 3] = ["-", "Virtual", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Bom,
    Csv,
    Parts,
    Kicad,
    Named,
}

impl ExportKind {
    pub const ALL: [ExportKind; 5] = [
        ExportKind::Bom,
        ExportKind::Csv,
        ExportKind::Parts,
        ExportKind::Kicad,
        ExportKind::Named,
    ];

    /// Output file name for project `name`.
    pub fn file_name(self, name: &str) -> String {
        match self {
            Self::Bom => format!("{name}_BOM.csv"),
            Self::Csv => format!("{name}_netlist.csv"),
            Self::Parts => format!("{name}_components.csv"),
            Self::Kicad => format!("{name}.net"),
            Self::Named => format!("{name}_named_nets.json"),
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::Bom => "BOM",
            Self::Csv => "connection list",
            Self::Parts => "component list",
            Self::Kicad => "KiCad netlist",
            Self::Named => "named nets",
        }
    }
}

impl FromStr for ExportKind {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bom" => Ok(Self::Bom),
            "csv" | "netlist" => Ok(Self::Csv),
            "parts" | "components" => Ok(Self::Parts),
            "kicad" | "net" => Ok(Self::Kicad),
            "named" | "json" => Ok(Self::Named),
            _ => Err(ProbeError::UnknownExport {
                kind: s.to_string(),
            }),
        }
    }
}

/// Write one export into `dir`, returning the path written.
pub fn export(project: &Project, kind: ExportKind, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(kind.file_name(project.name()));
    let mut writer = BufWriter::new(File::create(&path)?);
    let rows = match kind {
        ExportKind::Bom => write_bom(project, &mut writer)?,
        ExportKind::Csv => write_connections(project, &mut writer)?,
        ExportKind::Parts => write_component_list(project, &mut writer)?,
        ExportKind::Kicad => write_kicad_netlist(project, &mut writer)?,
        ExportKind::Named => write_named_nets(project, &mut writer)?,
    };
    writer.flush()?;
    tracing::info!("Exported {} to {} ({} entries)", kind.describe(), path.display(), rows);
    Ok(path)
}

/// Bill of materials grouped by value, package and description.
/// Returns the number of distinct lines.
pub fn write_bom<W: Write>(project: &Project, writer: W) -> Result<usize> {
    let mut groups: BTreeMap<(String, String, String), Vec<&str>> = BTreeMap::new();
    for (reference, component) in project.components().iter() {
        if NON_BOM_PACKAGES.contains(&component.package.as_str()) {
            continue;
        }
        let key = (
            component.display_value().to_string(),
            component.package.clone(),
            component.description.clone(),
        );
        groups.entry(key).or_default().push(reference);
    }

    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["Qty", "Value", "Package", "References", "Description"])?;
    for ((value, package, description), references) in &groups {
        csv.write_record([
            references.len().to_string(),
            value.clone(),
            package.clone(),
            references.join(", "),
            description.clone(),
        ])?;
    }
    csv.flush()?;
    Ok(groups.len())
}

/// One row per connection.
pub fn write_connections<W: Write>(project: &Project, writer: W) -> Result<usize> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["Pin1", "Pin2", "Ref1", "Pin1#", "Ref2", "Pin2#"])?;
    for connection in project.connections().iter() {
        let (a, b) = (connection.a(), connection.b());
        csv.write_record([
            a.to_string(),
            b.to_string(),
            a.reference().to_string(),
            a.pin_label(),
            b.reference().to_string(),
            b.pin_label(),
        ])?;
    }
    csv.flush()?;
    Ok(project.connections().len())
}

/// Every component with its recorded measurements.
pub fn write_component_list<W: Write>(project: &Project, writer: W) -> Result<usize> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record([
        "Ref",
        "Type",
        "Value",
        "Package",
        "Pins",
        "Measured_R",
        "Measured_C",
        "Measured_Vf",
        "Measured_hFE",
        "Marking",
        "Description",
    ])?;
    for (reference, component) in project.components().iter() {
        let measured = &component.measured;
        csv.write_record([
            reference.to_string(),
            component.kind.to_string(),
            component.display_value().to_string(),
            component.package.clone(),
            component.pins.to_string(),
            measured.resistance.map(|r| r.to_string()).unwrap_or_default(),
            measured.capacitance.map(|c| c.to_string()).unwrap_or_default(),
            measured.forward_voltage.map(|v| v.to_string()).unwrap_or_default(),
            measured.hfe.map(|h| format!("{h:.0}")).unwrap_or_default(),
            measured.marking.clone().unwrap_or_default(),
            component.description.clone(),
        ])?;
    }
    csv.flush()?;
    Ok(project.components().len())
}

#[derive(Serialize)]
struct NamedNetEntry {
    pin_count: usize,
    pins: Vec<String>,
}

#[derive(Serialize)]
struct NamedNetsFile<'a> {
    nets: BTreeMap<String, NamedNetEntry>,
    conflicts: &'a [NameConflict],
    total_connections: usize,
    timestamp: DateTime<Utc>,
}

/// Placeholder for a net nobody named: `NET_R1_2`.
pub fn placeholder_name(net: &Net) -> String {
    format!("NET_{}", net.representative().to_string().replace('-', "_"))
}

/// Nets keyed by name, as JSON. Returns the number of nets.
pub fn write_named_nets<W: Write>(project: &Project, writer: W) -> Result<usize> {
    let netlist = project.netlist();
    let mut nets = BTreeMap::new();
    for net in &netlist.nets {
        let mut name = netlist
            .name_of(net)
            .map(str::to_string)
            .unwrap_or_else(|| placeholder_name(net));
        if nets.contains_key(&name) {
            name = format!("{}@{}", name, net.representative());
        }
        nets.insert(
            name,
            NamedNetEntry {
                pin_count: net.len(),
                pins: net.members().iter().map(|p| p.to_string()).collect(),
            },
        );
    }

    let count = nets.len();
    let file = NamedNetsFile {
        nets,
        conflicts: netlist.conflicts(),
        total_connections: project.connections().len(),
        timestamp: Utc::now(),
    };
    serde_json::to_writer_pretty(writer, &file)?;
    Ok(count)
}

fn quoted(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// KiCad S-expression netlist. Returns the number of nets.
pub fn write_kicad_netlist<W: Write>(project: &Project, mut writer: W) -> Result<usize> {
    let netlist = project.netlist();
    writeln!(writer, "(export (version \"E\")")?;
    writeln!(writer, "  (design")?;
    writeln!(writer, "    (source {})", quoted(project.name()))?;
    writeln!(writer, "    (date {})", quoted(&Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()))?;
    writeln!(writer, "    (tool \"pcbprobe\"))")?;

    writeln!(writer, "  (components")?;
    for (reference, component) in project.components().iter() {
        write!(
            writer,
            "    (comp (ref {})\n      (value {})",
            quoted(reference),
            quoted(component.display_value())
        )?;
        if !matches!(component.package.as_str(), "" | "?") {
            write!(writer, "\n      (footprint {})", quoted(&component.package))?;
        }
        if !component.description.is_empty() {
            write!(writer, "\n      (description {})", quoted(&component.description))?;
        }
        writeln!(writer, ")")?;
    }
    writeln!(writer, "  )")?;

    writeln!(writer, "  (nets")?;
    for (code, net) in netlist.nets.iter().enumerate() {
        let name = match netlist.name_of(net) {
            Some(name) => name.to_string(),
            None => format!("Net-({})", net.representative()),
        };
        write!(writer, "    (net (code \"{}\") (name {})", code + 1, quoted(&name))?;
        for pin in net.members() {
            write!(
                writer,
                "\n      (node (ref {}) (pin {}))",
                quoted(pin.reference()),
                quoted(&pin.pin_label())
            )?;
        }
        writeln!(writer, ")")?;
    }
    writeln!(writer, "  ))")?;
    writer.flush()?;
    Ok(netlist.nets.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn sample() -> Project {
        let mut p = Project::new("amp", Settings::default());
        p.add_component("R1", None, Some("4700"), Some("0805")).unwrap();
        p.add_component("R2", None, Some("4k7"), Some("0805")).unwrap();
        p.add_component("C1", None, Some("100n"), Some("0603")).unwrap();
        p.add_component("GND", Some(1), None, Some("-")).unwrap();
        p.add_connection("R1-1", "GND").unwrap();
        p.add_connection("C1-2", "GND-1").unwrap();
        p.add_connection("R1-2", "R2-1").unwrap();
        p.name_net("GND", "GND").unwrap();
        p
    }

    fn render(write: impl Fn(&Project, &mut Vec<u8>) -> Result<usize>) -> String {
        let mut buf = Vec::new();
        write(&sample(), &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_bom_groups_and_skips_virtual() {
        let text = render(|p, w| write_bom(p, w));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Qty,Value,Package,References,Description");
        assert!(lines.contains(&"2,4.7k,0805,\"R1, R2\","));
        assert!(lines.contains(&"1,100nF,0603,C1,"));
        assert!(!text.contains("GND"));
    }

    #[test]
    fn test_connection_csv() {
        let text = render(|p, w| write_connections(p, w));
        assert!(text.starts_with("Pin1,Pin2,Ref1,Pin1#,Ref2,Pin2#\n"));
        assert!(text.contains("C1-2,GND,C1,2,GND,1\n"));
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn test_component_list() {
        let mut p = sample();
        p.measure("R1", crate::component::MeasurementKind::Resistance, "4.68k").unwrap();
        let mut buf = Vec::new();
        write_component_list(&p, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("R1,resistor,4.68k,0805,2,4.68k,,,,,\n"));
    }

    #[test]
    fn test_named_nets_json() {
        let text = render(|p, w| write_named_nets(p, w));
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["nets"]["GND"]["pin_count"], 3);
        assert_eq!(json["nets"]["NET_R1_2"]["pins"][1], "R2-1");
        assert_eq!(json["total_connections"], 3);
        assert!(json["conflicts"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_kicad_netlist() {
        let text = render(|p, w| write_kicad_netlist(p, w));
        assert!(text.starts_with("(export (version \"E\")"));
        assert!(text.contains("(net (code \"1\") (name \"GND\")"));
        assert!(text.contains("(node (ref \"GND\") (pin \"1\"))"));
        assert!(text.contains("(name \"Net-(R1-2)\")"));
        assert!(text.contains("(footprint \"0805\")"));
        assert_eq!(text.matches('(').count(), text.matches(')').count());
    }

    /// Accepts `room` bytes, then fails every write.
    struct FullDisk {
        room: usize,
    }

    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.room == 0 {
                return Err(std::io::Error::other("disk full"));
            }
            let n = buf.len().min(self.room);
            self.room -= n;
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_kicad_netlist_write_error_propagates() {
        let project = sample();
        for room in [0, 64] {
            assert!(matches!(
                write_kicad_netlist(&project, FullDisk { room }),
                Err(ProbeError::Io(_))
            ));
        }
    }

    #[test]
    fn test_export_kind_names() {
        assert_eq!("BOM".parse::<ExportKind>().unwrap(), ExportKind::Bom);
        assert_eq!(ExportKind::Kicad.file_name("amp"), "amp.net");
        assert!("pdf".parse::<ExportKind>().is_err());
    }
}
