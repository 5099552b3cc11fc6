//! pcbprobe - connectivity bookkeeping for PCB reverse engineering
//!
//! Record which pins you found connected with a continuity tester, and
//! pcbprobe derives the nets those connections imply, keeps your net names
//! attached while the picture changes, and normalizes the component values
//! you type in along the way.
//!
//! # Quick Start
//!
//! ```no_run
//! use pcbprobe::{Project, ProjectFiles, Settings};
//!
//! let files = ProjectFiles::new(".", "amp");
//! let mut project = files.load(Settings::default()).unwrap();
//!
//! project.add_connection("R1-1", "C3-2").unwrap();
//! project.add_connection("C3-2", "U1-4").unwrap();
//! project.name_net("U1-4", "VREF").unwrap();
//!
//! let netlist = project.netlist();
//! for net in &netlist.nets {
//!     println!("{}: {} pins", netlist.name_of(net).unwrap_or("?"), net.len());
//! }
//! files.save(&project).unwrap();
//! ```
//!
//! # Features
//!
//! - **Pins**: `REF-N`, `REF-TAB` and bare `REF` for one-pin parts, one canonical identity each
//! - **Nets**: union-find, incremental on add, rebuilt after deletes and merges
//! - **Net names**: bound to pins, deterministic winner when two named nets join
//! - **Values**: `4k7`, `0.1u`, `650mV` parsed and printed in canonical form
//! - **Exports**: BOM, connection/component CSV, named-net JSON, KiCad netlist

pub mod audit;
pub mod component;
pub mod config;
pub mod connection;
pub mod error;
pub mod export;
pub mod naming;
pub mod nets;
pub mod pin;
pub mod project;
pub mod store;
pub mod value;

// Re-export main types
pub use component::{
    Component, ComponentKind, ComponentStore, MeasurementKind, Measurements, TransistorType,
};
pub use config::Settings;
pub use connection::{Connection, ConnectionStore, MergeOutcome};
pub use error::{ProbeError, Result};
pub use export::ExportKind;
pub use naming::{NameBinding, NameConflict, NetNameRegistry, Resolution};
pub use nets::{DisjointSet, Net, NetBuilder};
pub use pin::{PinDesignator, PinId, PinRegistry};
pub use project::{Added, ComponentField, Netlist, Project, ProjectStats, RemainingPins};
pub use store::ProjectFiles;
pub use value::{Capacitance, Reading, Resistance, ValueError, Voltage};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        Connection, ExportKind, Net, PinId, ProbeError, Project, ProjectFiles, Settings,
    };
}
