//! Read-only view of the sound server: sinks, sources and loaded modules.
//!
//! The server only offers flat text listings, so all of the parsing lives
//! here. Every query degrades to an empty result on failure; callers treat
//! empty as "unknown" and never retry in a loop.

use std::collections::HashMap;
use std::sync::Arc;

use fanoutconf::SelectionHints;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::server::CommandRunner;
use crate::types::{DeviceState, ModuleBlock, ModuleId, OutputChannel, OutputDevice, SourceSnapshot};

#[derive(Clone)]
pub struct Catalog {
    runner: Arc<dyn CommandRunner>,
    reserved: Vec<String>,
}

impl Catalog {
    /// `reserved` names are pipeline sinks and never offered as outputs.
    pub fn new(runner: Arc<dyn CommandRunner>, reserved: Vec<String>) -> Self {
        Self { runner, reserved }
    }

    fn query(&self, args: &[&str]) -> Option<String> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        match self.runner.run(&args) {
            Ok(out) => Some(out),
            Err(e) => {
                warn!(error = %e, "catalog query failed");
                None
            }
        }
    }

    /// Output devices a routing target may point at, in server order.
    pub fn list_output_devices(&self) -> Vec<OutputDevice> {
        self.list_all_sinks()
            .into_iter()
            .filter(|d| !self.reserved.contains(&d.name))
            .collect()
    }

    /// Every sink, pipeline sinks included.
    pub fn list_all_sinks(&self) -> Vec<OutputDevice> {
        self.query(&["list", "short", "sinks"])
            .map(|out| parse_short_sinks(&out))
            .unwrap_or_default()
    }

    /// The sink a pipeline would be built on right now: `conventional` if it
    /// exists, else the first of `fallbacks` that does. None means a new base
    /// sink has to be created.
    pub fn existing_base_sink(&self, conventional: &str, fallbacks: &[String]) -> Option<String> {
        let sinks = self.list_all_sinks();
        let exists = |name: &str| sinks.iter().any(|s| s.name == name);

        if exists(conventional) {
            return Some(conventional.to_string());
        }
        fallbacks.iter().find(|name| exists(name.as_str())).cloned()
    }

    /// Module instances currently loaded. Each iteration re-queries the server.
    pub fn list_active_modules(&self) -> ModuleListing {
        ModuleListing {
            runner: self.runner.clone(),
        }
    }

    /// Raw sink name to its human description, from one listing.
    pub fn display_names(&self) -> HashMap<String, String> {
        self.query(&["list", "sinks"])
            .map(|out| parse_descriptions(&out))
            .unwrap_or_default()
    }

    pub fn resolve_display_name(&self, raw_name: &str) -> String {
        self.display_names()
            .remove(raw_name)
            .unwrap_or_else(|| raw_name.to_string())
    }

    pub fn source_snapshot(&self, name: &str) -> Option<SourceSnapshot> {
        let out = self.query(&["list", "sources"])?;
        parse_source_snapshot(&out, name)
    }
}

/// Restartable, lazily parsed module listing.
#[derive(Clone)]
pub struct ModuleListing {
    runner: Arc<dyn CommandRunner>,
}

impl ModuleListing {
    /// Query the server and walk the result block by block. A failed query
    /// yields nothing; malformed or truncated blocks are skipped.
    pub fn iter(&self) -> ModuleBlocks {
        let text = match self.runner.run(&["list".to_string(), "modules".to_string()]) {
            Ok(out) => out,
            Err(e) => {
                warn!(error = %e, "module listing failed");
                String::new()
            }
        };
        ModuleBlocks::new(text)
    }
}

impl IntoIterator for &ModuleListing {
    type Item = ModuleBlock;
    type IntoIter = ModuleBlocks;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

const MODULE_HEADER: &str = "Module #";

/// Iterator over the blocks of one `list modules` output.
pub struct ModuleBlocks {
    text: String,
    pos: usize,
}

impl ModuleBlocks {
    pub fn new(text: String) -> Self {
        Self { text, pos: 0 }
    }
}

impl Iterator for ModuleBlocks {
    type Item = ModuleBlock;

    fn next(&mut self) -> Option<ModuleBlock> {
        loop {
            let rest = &self.text[self.pos..];
            let start = find_header(rest, MODULE_HEADER)?;
            let body = start + MODULE_HEADER.len();
            let end = find_header(&rest[body..], MODULE_HEADER)
                .map(|e| body + e)
                .unwrap_or(rest.len());

            let chunk = &rest[start..end];
            self.pos += end;

            if let Some(block) = parse_module_block(chunk) {
                return Some(block);
            }
        }
    }
}

/// Offset of the first line starting with `header`.
fn find_header(text: &str, header: &str) -> Option<usize> {
    if text.starts_with(header) {
        return Some(0);
    }
    text.find(&format!("\n{header}")).map(|i| i + 1)
}

fn split_blocks<'a>(text: &'a str, header: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    let mut rest = text;
    std::iter::from_fn(move || {
        let start = find_header(rest, header)?;
        let body = start + header.len();
        let end = find_header(&rest[body..], header)
            .map(|e| body + e)
            .unwrap_or(rest.len());
        let chunk = &rest[start..end];
        rest = &rest[end..];
        Some(chunk)
    })
}

fn field<'a>(block: &'a str, key: &str) -> Option<&'a str> {
    block
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix(key)?.strip_prefix(':'))
        .map(str::trim)
}

fn parse_module_block(chunk: &str) -> Option<ModuleBlock> {
    let header = chunk.lines().next()?;
    let id = header.strip_prefix(MODULE_HEADER)?.trim();
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let name = field(chunk, "Name")?;
    if name.is_empty() {
        return None;
    }

    Some(ModuleBlock {
        id: ModuleId(id.to_string()),
        name: name.to_string(),
        text: chunk.trim_end().to_string(),
    })
}

/// `<index> <name> <driver> <sample spec...> <state>`, whitespace separated.
pub fn parse_short_sinks(out: &str) -> Vec<OutputDevice> {
    out.lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 2 {
                return None;
            }
            let state = if parts.len() >= 5 {
                DeviceState::parse(parts[parts.len() - 1])
            } else {
                DeviceState::Unknown
            };
            Some(OutputDevice {
                id: parts[0].to_string(),
                name: parts[1].to_string(),
                state,
            })
        })
        .collect()
}

fn parse_descriptions(out: &str) -> HashMap<String, String> {
    split_blocks(out, "Sink #")
        .filter_map(|block| {
            let name = field(block, "Name")?;
            let description = field(block, "Description")?;
            Some((name.to_string(), description.to_string()))
        })
        .collect()
}

fn parse_source_snapshot(out: &str, name: &str) -> Option<SourceSnapshot> {
    let block = split_blocks(out, "Source #").find(|b| field(b, "Name") == Some(name))?;

    let volumes = field(block, "Volume")
        .map(|line| {
            line.split_whitespace()
                .filter_map(|tok| tok.trim_end_matches(',').strip_suffix('%'))
                .filter_map(|pct| pct.parse::<f64>().ok())
                .collect()
        })
        .unwrap_or_default();

    Some(SourceSnapshot {
        name: name.to_string(),
        state: field(block, "State").map(DeviceState::parse).unwrap_or(DeviceState::Unknown),
        volumes,
        muted: field(block, "Mute") == Some("yes"),
    })
}

/// Devices picked for each output channel from configured hints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingSuggestion {
    pub front: Option<String>,
    pub rear_left: Option<String>,
    pub rear_right: Option<String>,
}

impl RoutingSuggestion {
    pub fn device_for(&self, channel: OutputChannel) -> Option<&str> {
        match channel {
            OutputChannel::Front => self.front.as_deref(),
            OutputChannel::RearLeft => self.rear_left.as_deref(),
            OutputChannel::RearRight => self.rear_right.as_deref(),
        }
    }
}

/// Pre-select devices by case-insensitive substring. Earlier hints take
/// priority over later ones; ties go to the device listed first.
pub fn suggest_routing(devices: &[OutputDevice], hints: &SelectionHints) -> RoutingSuggestion {
    let pick = |hints: &[String]| -> Option<String> {
        hints.iter().find_map(|hint| {
            let hint = hint.to_lowercase();
            devices
                .iter()
                .find(|d| d.name.to_lowercase().contains(&hint))
                .map(|d| d.name.clone())
        })
    };

    RoutingSuggestion {
        front: pick(&hints.front),
        rear_left: pick(&hints.rear_left),
        rear_right: pick(&hints.rear_right),
    }
}
