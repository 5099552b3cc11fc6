//! Interactive probing session: one command per line.

use std::io::{BufRead, Write};

use anyhow::{bail, Context, Result};
use pcbprobe::export::export;
use pcbprobe::{ComponentField, ExportKind, MeasurementKind, Netlist, Project, ProjectFiles};

const HELP: &str = "\
COMPONENTS
  cadd <ref> [pins] [value] [package]   Add or replace a component
  cedit <ref> <field> <value...>        Edit pins/value/package/description
  cdel <ref>                            Delete a component and its connections
  clist [prefix]                        List components
  cshow <ref>                           Show one component

MEASUREMENTS
  m <ref> <value>                       Measure, kind picked from the reference
  mr|mc|mv|mh|mt <ref> <value>          Resistance, capacitance, Vf, hFE, type

CONNECTIONS
  <pin> <pin>                           Connect (both pins contain '-')
  add <pin> <pin>                       Connect
  del <pin> [<pin>]                     Delete one connection, or all of a pin
  pdel <pin>                            Delete all connections of a pin
  merge <from> <to>                     Move connections of one pin onto another
  find <pin|ref>                        Show connections

NETS
  name <pin> <name>                     Name the net containing a pin
  nets                                  Show all nets
  remaining [prefix]                    Pins with no connection yet
  stats                                 Counts
  check                                 Audit nets against a graph traversal

FILES
  export <bom|csv|parts|kicad|named|all>
  save                                  Save project
  quit                                  Save and exit
";

/// What the loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Session<W: Write> {
    project: Project,
    files: ProjectFiles,
    out: W,
}

impl<W: Write> Session<W> {
    pub fn new(project: Project, files: ProjectFiles, out: W) -> Self {
        Self {
            project,
            files,
            out,
        }
    }

    #[cfg(test)]
    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn save(&mut self) -> Result<()> {
        self.files
            .save(&self.project)
            .with_context(|| format!("saving project to {}", self.files.dir().display()))?;
        writeln!(self.out, "  Saved '{}'", self.project.name())?;
        Ok(())
    }

    /// Read commands until `quit` or end of input, then save.
    pub fn run<R: BufRead>(&mut self, input: R) -> Result<()> {
        write!(self.out, "> ")?;
        self.out.flush()?;
        for line in input.lines() {
            let line = line?;
            match self.execute(&line) {
                Ok(Flow::Quit) => return self.save(),
                Ok(Flow::Continue) => {}
                Err(e) => writeln!(self.out, "  Error: {:#}", e)?,
            }
            write!(self.out, "> ")?;
            self.out.flush()?;
        }
        writeln!(self.out)?;
        self.save()
    }

    /// Execute one command line.
    pub fn execute(&mut self, line: &str) -> Result<Flow> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = words.first() else {
            return Ok(Flow::Continue);
        };
        let action = first.to_lowercase();
        let args = &words[1..];

        if words.len() == 2 && words[0].contains('-') && words[1].contains('-') {
            self.connect(words[0], words[1])?;
            return Ok(Flow::Continue);
        }

        match (action.as_str(), args) {
            ("cadd", [reference, rest @ ..]) => self.add_component(reference, rest)?,
            ("cedit", [reference, field, value @ ..]) if !value.is_empty() => {
                let field: ComponentField = field.parse()?;
                self.project
                    .edit_component(reference, field, &value.join(" "))?;
                self.show_component(reference)?;
            }
            ("cdel", [reference]) => {
                let removed = self.project.delete_component(reference)?;
                writeln!(self.out, "  Deleted {} ({} connections removed)", reference, removed)?;
            }
            ("clist", rest) => self.list_components(rest.first().copied())?,
            ("cshow", [reference]) => self.show_component(reference)?,

            ("m", [reference, value]) => {
                let line = self.project.quick_measure(reference, value)?;
                writeln!(self.out, "  {}: {}", reference, line)?;
            }
            ("mr" | "mc" | "mv" | "mh" | "mt", [reference, value]) => {
                let kind = match action.as_str() {
                    "mr" => MeasurementKind::Resistance,
                    "mc" => MeasurementKind::Capacitance,
                    "mv" => MeasurementKind::ForwardVoltage,
                    "mh" => MeasurementKind::Hfe,
                    _ => MeasurementKind::TransistorType,
                };
                let line = self.project.measure(reference, kind, value)?;
                writeln!(self.out, "  {}: {}", reference, line)?;
            }

            ("add", [a, b]) => self.connect(a, b)?,
            ("del", [a, b]) => {
                self.project.delete_edge(a, b)?;
                writeln!(self.out, "  Deleted {} <-> {}", a, b)?;
            }
            ("del" | "pdel", [pin]) => {
                let removed = self.project.delete_by_pin(pin)?;
                writeln!(self.out, "  Deleted {} connections of {}", removed, pin)?;
            }
            ("merge", [from, to]) => {
                let outcome = self.project.merge_pins(from, to)?;
                if outcome.touched() == 0 {
                    writeln!(self.out, "  Nothing to merge from {}", from)?;
                } else {
                    writeln!(
                        self.out,
                        "  Merged {} into {}: {} moved, {} duplicates dropped",
                        from, to, outcome.moved, outcome.dropped
                    )?;
                }
            }
            ("find" | "comp", [target]) => {
                let found = self.project.find(target)?;
                if found.is_empty() {
                    writeln!(self.out, "  No connections found for {}", target)?;
                }
                for connection in found {
                    writeln!(self.out, "    {}", connection)?;
                }
            }

            ("name", [pin, name]) => {
                let net = self.project.name_net(pin, name)?;
                writeln!(self.out, "  Net '{}' ({} pins)", name, net.len())?;
            }
            ("nets", []) => {
                let netlist = self.project.netlist();
                write_nets_human(&mut self.out, &netlist)?;
            }
            ("remaining" | "rem" | "todo", rest) => self.remaining(rest.first().copied())?,
            ("stats", []) => write_stats(&mut self.out, &self.project)?,
            ("check", []) => {
                self.project.verify()?;
                writeln!(self.out, "  Nets consistent ({} nets)", self.project.nets().len())?;
            }

            ("export", [kind]) => self.export(kind)?,
            ("bom" | "csv" | "parts" | "kicad" | "named" | "all", []) => self.export(&action)?,
            ("save", []) => self.save()?,
            ("help", _) => write!(self.out, "{}", HELP)?,
            ("quit" | "exit" | "q", []) => return Ok(Flow::Quit),
            _ => bail!("unknown or incomplete command '{}' (type 'help')", line.trim()),
        }
        Ok(Flow::Continue)
    }

    fn connect(&mut self, a: &str, b: &str) -> Result<()> {
        let added = self.project.add_connection(a, b)?;
        for reference in &added.created {
            writeln!(self.out, "  Created {}", reference)?;
        }
        if added.new {
            writeln!(self.out, "  + {}", added.connection)?;
        } else {
            writeln!(self.out, "  Already connected: {}", added.connection)?;
        }
        Ok(())
    }

    fn add_component(&mut self, reference: &str, rest: &[&str]) -> Result<()> {
        let mut rest = rest.iter().copied().peekable();
        let pins = match rest.peek().map(|w| w.parse::<u32>()) {
            Some(Ok(pins)) => {
                rest.next();
                Some(pins)
            }
            _ => None,
        };
        let value = rest.next();
        let package = rest.next();
        let component = self.project.add_component(reference, pins, value, package)?;
        writeln!(
            self.out,
            "  {} {} {} ({} pins)",
            reference,
            component.display_value(),
            component.package,
            component.pins
        )?;
        Ok(())
    }

    fn list_components(&mut self, prefix: Option<&str>) -> Result<()> {
        let prefix = prefix.map(str::to_uppercase);
        let mut shown = 0;
        for (reference, component) in self.project.components().iter() {
            if let Some(prefix) = &prefix {
                if !reference.to_uppercase().starts_with(prefix.as_str()) {
                    continue;
                }
            }
            let measured = component.measured.summary();
            let measured = if measured.is_empty() {
                String::new()
            } else {
                format!("  [{}]", measured.join(", "))
            };
            let predicted = if component.predicted { " [PREDICTED]" } else { "" };
            writeln!(
                self.out,
                "  {:<8} {:<12} {:<10} {} pins{}{}",
                reference,
                component.display_value(),
                component.package,
                component.pins,
                measured,
                predicted
            )?;
            shown += 1;
        }
        writeln!(self.out, "  {} components", shown)?;
        Ok(())
    }

    fn show_component(&mut self, reference: &str) -> Result<()> {
        let reference = self.project.registry().normalize_reference(reference);
        let Some(component) = self.project.components().get(&reference) else {
            bail!("component {} not found", reference);
        };
        writeln!(self.out, "  {} ({})", reference, component.kind)?;
        writeln!(self.out, "    Value:    {}", component.display_value())?;
        writeln!(self.out, "    Package:  {}", component.package)?;
        writeln!(self.out, "    Pins:     {}", component.pins)?;
        if component.predicted {
            writeln!(self.out, "    Status:   predicted, not yet measured")?;
        }
        if !component.description.is_empty() {
            writeln!(self.out, "    Desc:     {}", component.description)?;
        }
        for line in component.measured.summary() {
            writeln!(self.out, "    Measured: {}", line)?;
        }
        for connection in self.project.find(&reference)? {
            writeln!(self.out, "    {}", connection)?;
        }
        Ok(())
    }

    fn remaining(&mut self, prefix: Option<&str>) -> Result<()> {
        let remaining = self.project.remaining(prefix);
        if remaining.is_empty() {
            writeln!(self.out, "  All pins connected")?;
        }
        for entry in remaining {
            let pins: Vec<String> = entry.pins.iter().map(u32::to_string).collect();
            writeln!(
                self.out,
                "  {} ({}): pins {}",
                entry.reference,
                entry.value,
                pins.join(", ")
            )?;
        }
        Ok(())
    }

    fn export(&mut self, kind: &str) -> Result<()> {
        let kinds: Vec<ExportKind> = if kind.eq_ignore_ascii_case("all") {
            ExportKind::ALL.to_vec()
        } else {
            vec![kind.parse()?]
        };
        for kind in kinds {
            let path = export(&self.project, kind, self.files.dir())?;
            writeln!(self.out, "  Exported {} to {}", kind.describe(), path.display())?;
        }
        Ok(())
    }
}

pub fn write_nets_human<W: Write>(out: &mut W, netlist: &Netlist) -> Result<()> {
    writeln!(out, "=== Nets ({}) ===", netlist.nets.len())?;
    for net in &netlist.nets {
        let name = netlist.name_of(net).unwrap_or("(unnamed)");
        writeln!(out, "  {}: {} pins", name, net.len())?;
        for pin in net.members() {
            writeln!(out, "    {}", pin)?;
        }
    }
    for conflict in netlist.conflicts() {
        writeln!(out, "  Warning: {}", conflict)?;
    }
    Ok(())
}

pub fn nets_json(netlist: &Netlist) -> serde_json::Value {
    serde_json::json!({
        "nets": netlist.nets.iter().map(|net| {
            serde_json::json!({
                "name": netlist.name_of(net),
                "representative": net.representative(),
                "pins": net.members().iter().collect::<Vec<_>>(),
            })
        }).collect::<Vec<_>>(),
        "conflicts": netlist.conflicts(),
    })
}

pub fn write_stats<W: Write>(out: &mut W, project: &Project) -> Result<()> {
    let stats = project.stats();
    writeln!(out, "  Components:  {}", stats.components)?;
    writeln!(out, "  Connections: {}", stats.connections)?;
    writeln!(out, "  Nets:        {} ({} named)", stats.nets, stats.named_nets)?;
    writeln!(out, "  Measured:    {}", stats.measured)?;
    for (prefix, count) in &stats.by_prefix {
        writeln!(out, "    {}: {}", prefix, count)?;
    }
    Ok(())
}
