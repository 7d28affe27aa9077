//! In-memory stand-in for `pactl`.
//!
//! Tracks modules, the sinks and sources they create, default sink and
//! volumes, and enforces the same load-time dependencies the real server does:
//! a filter sink needs its master sink, a remap source needs the monitored
//! sink, a loopback needs both ends.

#![allow(dead_code)]

use fanout::{CommandRunner, ExternalCallFailure, ModuleId};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

pub const FRONT_DEVICE: &str = "alsa_output.pci-0000_00_1f.3.iec958-stereo";
pub const REAR_DEVICE: &str = "alsa_output.pci-0000_03_00.1.hdmi-stereo";
pub const OTHER_DEVICE: &str = "alsa_output.usb-Focusrite-00.analog-stereo";

#[derive(Debug, Clone)]
pub struct FakeModule {
    pub name: String,
    pub args: Vec<String>,
}

impl FakeModule {
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args
            .iter()
            .find_map(|a| a.strip_prefix(key)?.strip_prefix('='))
    }
}

#[derive(Debug, Clone)]
struct Endpoint {
    id: u32,
    name: String,
    description: String,
    owner: Option<u32>,
}

#[derive(Debug, Default)]
struct State {
    next_module: u32,
    next_endpoint: u32,
    modules: BTreeMap<u32, FakeModule>,
    sinks: Vec<Endpoint>,
    sources: Vec<Endpoint>,
    default_sink: Option<String>,
    volumes: HashMap<String, Vec<String>>,
    calls: Vec<Vec<String>>,
    loads: usize,
    fail_load_at: Option<usize>,
    fail_unloads: bool,
}

pub struct FakePactl {
    state: Mutex<State>,
}

fn failure(args: &[String], stderr: &str) -> ExternalCallFailure {
    ExternalCallFailure::NonZeroExit {
        command: format!("pactl {}", args.join(" ")),
        status: "exit status: 1".to_string(),
        stderr: stderr.to_string(),
    }
}

impl FakePactl {
    /// A server with three hardware sinks and nothing of ours loaded.
    pub fn new() -> Arc<Self> {
        let fake = Self {
            state: Mutex::new(State {
                next_module: 100,
                next_endpoint: 40,
                ..State::default()
            }),
        };
        {
            let mut state = fake.state.lock().unwrap();
            for (name, description) in [
                (FRONT_DEVICE, "Built-in Audio Digital Stereo (IEC958)"),
                (REAR_DEVICE, "Navi 21 HDMI Audio Digital Stereo"),
                (OTHER_DEVICE, "Scarlett 2i2 Analog Stereo"),
            ] {
                state.add_sink(name, description, None);
            }
        }
        Arc::new(fake)
    }

    /// Load a module directly, bypassing the call log.
    pub fn preload(&self, module: &str, args: &[&str]) -> ModuleId {
        let mut argv = vec!["load-module".to_string(), module.to_string()];
        argv.extend(args.iter().map(|a| a.to_string()));
        let mut state = self.state.lock().unwrap();
        let id = state.load(&argv).expect("preload failed");
        ModuleId(id.to_string())
    }

    /// A generic null sink owned by someone else.
    pub fn with_foreign_null_sink(self: Arc<Self>) -> Arc<Self> {
        self.preload(
            "module-null-sink",
            &["sink_name=null", "sink_properties=device.description=Null"],
        );
        self
    }

    /// A sink that no module of ours created, e.g. one from a session
    /// manager. Teardown predicates cannot match it.
    pub fn with_unmanaged_sink(self: Arc<Self>, name: &str) -> Arc<Self> {
        self.state.lock().unwrap().add_sink(name, name, None);
        self
    }

    /// Make the `n`th load-module call (1-based, counted from now) fail.
    pub fn fail_load_at(&self, n: usize) {
        let mut state = self.state.lock().unwrap();
        state.fail_load_at = Some(state.loads + n);
    }

    pub fn fail_unloads(&self, fail: bool) {
        self.state.lock().unwrap().fail_unloads = fail;
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Calls whose first argument is `verb`.
    pub fn calls_to(&self, verb: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|c| c.first().map(String::as_str) == Some(verb))
            .collect()
    }

    pub fn modules(&self) -> Vec<(ModuleId, FakeModule)> {
        self.state
            .lock()
            .unwrap()
            .modules
            .iter()
            .map(|(id, m)| (ModuleId(id.to_string()), m.clone()))
            .collect()
    }

    pub fn modules_named(&self, name: &str) -> Vec<FakeModule> {
        self.modules()
            .into_iter()
            .map(|(_, m)| m)
            .filter(|m| m.name == name)
            .collect()
    }

    pub fn module_name(&self, id: &str) -> Option<String> {
        let id: u32 = id.parse().ok()?;
        self.state.lock().unwrap().modules.get(&id).map(|m| m.name.clone())
    }

    /// Module name and arguments, sorted, for comparing topologies.
    pub fn topology(&self) -> Vec<(String, Vec<String>)> {
        let mut topo: Vec<_> = self
            .modules()
            .into_iter()
            .map(|(_, m)| (m.name, m.args))
            .collect();
        topo.sort();
        topo
    }

    pub fn has_sink(&self, name: &str) -> bool {
        self.state.lock().unwrap().sinks.iter().any(|s| s.name == name)
    }

    pub fn default_sink(&self) -> Option<String> {
        self.state.lock().unwrap().default_sink.clone()
    }

    pub fn volume(&self, device: &str) -> Option<Vec<String>> {
        self.state.lock().unwrap().volumes.get(device).cloned()
    }
}

impl State {
    fn add_sink(&mut self, name: &str, description: &str, owner: Option<u32>) {
        let id = self.next_endpoint;
        self.next_endpoint += 1;
        self.sinks.push(Endpoint {
            id,
            name: name.to_string(),
            description: description.to_string(),
            owner,
        });
        self.sources.push(Endpoint {
            id,
            name: format!("{name}.monitor"),
            description: format!("Monitor of {description}"),
            owner,
        });
    }

    fn add_source(&mut self, name: &str, owner: u32) {
        let id = self.next_endpoint;
        self.next_endpoint += 1;
        self.sources.push(Endpoint {
            id,
            name: name.to_string(),
            description: name.to_string(),
            owner: Some(owner),
        });
    }

    fn sink_exists(&self, name: &str) -> bool {
        self.sinks.iter().any(|s| s.name == name)
    }

    fn source_exists(&self, name: &str) -> bool {
        self.sources.iter().any(|s| s.name == name)
    }

    fn load(&mut self, args: &[String]) -> Result<u32, ExternalCallFailure> {
        let Some(name) = args.get(1) else {
            return Err(failure(args, "You have to specify a module name"));
        };
        let module = FakeModule {
            name: name.clone(),
            args: args[2..].to_vec(),
        };
        let id = self.next_module;
        let broken = || failure(args, "Failure: Module initialization failed");

        match module.name.as_str() {
            "module-null-sink" => {
                let sink = module.arg("sink_name").ok_or_else(broken)?;
                if self.sink_exists(sink) {
                    return Err(broken());
                }
                let description = module
                    .arg("sink_properties")
                    .and_then(|p| p.strip_prefix("device.description="))
                    .unwrap_or(sink)
                    .to_string();
                self.add_sink(sink, &description, Some(id));
            }
            "module-ladspa-sink" => {
                let sink = module.arg("sink_name").ok_or_else(broken)?;
                let master = module.arg("sink_master").ok_or_else(broken)?;
                if !self.sink_exists(master) || self.sink_exists(sink) {
                    return Err(broken());
                }
                if module.arg("plugin").is_none() || module.arg("label").is_none() {
                    return Err(broken());
                }
                self.add_sink(sink, sink, Some(id));
            }
            "module-remap-source" => {
                let source = module.arg("source_name").ok_or_else(broken)?;
                let master = module.arg("master").ok_or_else(broken)?;
                if !self.source_exists(master) || self.source_exists(source) {
                    return Err(broken());
                }
                self.add_source(source, id);
            }
            "module-loopback" => {
                let source = module.arg("source").ok_or_else(broken)?;
                let sink = module.arg("sink").ok_or_else(broken)?;
                if !self.source_exists(source) || !self.sink_exists(sink) {
                    return Err(broken());
                }
            }
            _ => {}
        }

        self.next_module += 1;
        self.modules.insert(id, module);
        Ok(id)
    }

    fn unload(&mut self, args: &[String]) -> Result<(), ExternalCallFailure> {
        if self.fail_unloads {
            return Err(failure(args, "Failure: Access denied"));
        }
        let id: u32 = args
            .get(1)
            .and_then(|a| a.parse().ok())
            .ok_or_else(|| failure(args, "Failure: Invalid module index"))?;
        if self.modules.remove(&id).is_none() {
            return Err(failure(args, "Failure: No such entity"));
        }
        self.sinks.retain(|s| s.owner != Some(id));
        self.sources.retain(|s| s.owner != Some(id));
        Ok(())
    }

    fn list(&self, args: &[String]) -> String {
        let what: Vec<&str> = args[1..].iter().map(String::as_str).collect();
        match what.as_slice() {
            ["short", "sinks"] => self
                .sinks
                .iter()
                .map(|s| format!("{}\t{}\tPipeWire\tfloat32le 2ch 48000Hz\tSUSPENDED\n", s.id, s.name))
                .collect(),
            ["sinks"] => self
                .sinks
                .iter()
                .map(|s| {
                    format!(
                        "Sink #{}\n\tState: SUSPENDED\n\tName: {}\n\tDescription: {}\n\tDriver: PipeWire\n\n",
                        s.id, s.name, s.description
                    )
                })
                .collect(),
            ["sources"] => self
                .sources
                .iter()
                .map(|s| {
                    format!(
                        "Source #{}\n\tState: IDLE\n\tName: {}\n\tDescription: {}\n\tMute: no\n\tVolume: front-left: 65536 / 100% / 0.00 dB,   front-right: 65536 / 100% / 0.00 dB\n\n",
                        s.id, s.name, s.description
                    )
                })
                .collect(),
            ["modules"] => self
                .modules
                .iter()
                .map(|(id, m)| {
                    format!(
                        "Module #{}\n\tName: {}\n\tArgument: {}\n\tUsage counter: n/a\n\tProperties:\n\t\tmodule.description = \"fake\"\n\n",
                        id,
                        m.name,
                        m.args.join(" ")
                    )
                })
                .collect(),
            _ => String::new(),
        }
    }
}

impl CommandRunner for FakePactl {
    fn run(&self, args: &[String]) -> Result<String, ExternalCallFailure> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(args.to_vec());

        match args.first().map(String::as_str) {
            Some("list") => Ok(state.list(args)),
            Some("load-module") => {
                state.loads += 1;
                if state.fail_load_at == Some(state.loads) {
                    return Err(failure(args, "Failure: Module initialization failed"));
                }
                state.load(args).map(|id| format!("{id}\n"))
            }
            Some("unload-module") => state.unload(args).map(|_| String::new()),
            Some("set-sink-volume") => {
                let device = args.get(1).cloned().unwrap_or_default();
                if !state.sink_exists(&device) {
                    return Err(failure(args, "Failure: No such entity"));
                }
                state.volumes.insert(device, args[2..].to_vec());
                Ok(String::new())
            }
            Some("set-default-sink") => {
                let sink = args.get(1).cloned().unwrap_or_default();
                if !state.sink_exists(&sink) {
                    return Err(failure(args, "Failure: No such entity"));
                }
                state.default_sink = Some(sink);
                Ok(String::new())
            }
            Some("set-card-profile") => Ok(String::new()),
            _ => Err(failure(args, "No valid command specified")),
        }
    }
}
