//! Builds a machine from its description.
//!
//! Every component named in the description is built, whether or not
//! anything refers to it, so that mistakes in unused parts of a
//! description are still reported.  The bus is built first (slaves
//! before the switches and bridges which route to them), then the
//! CPUs, then the peripherals.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use tracing::{event, span, Level};

use base::{AddressRange, StopSignal, SwitchId};
use bus::{
    Bridge, CpuGate, DefaultDevice, DeviceGate, Endpoint, Root, Slave, Switch, Transfer,
};
use cpu::{
    BusPort, ControlUnit, Cpu, DataPort, Executor, ExecutorId, InstructionForm,
    InstructionFunctor, InstructionRegistry, ProgramCounter, RegisterBank,
};

use super::config::{
    BridgeDescription, BusDescription, CpuDescription, MachineDescription, SwitchDescription,
};
use super::error::{ComponentKind, ConfigError, ModuleError};
use super::modules::{CpuContext, ExecutorContext, ModuleRegistry, PeripheralContext};
use super::peripheral::Peripheral;

#[derive(Clone, Copy)]
enum SlaveKind<'a> {
    Switch(&'a SwitchDescription),
    Bridge(&'a BridgeDescription),
    Default,
    Endpoint,
}

struct BusBuilder<'a> {
    kinds: BTreeMap<&'a str, SlaveKind<'a>>,
    built: BTreeMap<String, Arc<dyn Slave>>,
    in_progress: BTreeSet<String>,
    endpoints: BTreeMap<String, Arc<DeviceGate>>,
    transfers: Vec<Arc<dyn Transfer>>,
}

/// The bus, ready for CPUs and peripherals to be attached.
struct Fabric {
    roots: BTreeMap<String, Arc<dyn Root>>,
    endpoints: BTreeMap<String, Arc<DeviceGate>>,
    transfers: Vec<Arc<dyn Transfer>>,
}

impl<'a> BusBuilder<'a> {
    fn new(bus: &'a BusDescription) -> Result<BusBuilder<'a>, ConfigError> {
        let mut kinds: BTreeMap<&'a str, SlaveKind<'a>> = BTreeMap::new();
        let mut add = |name: &'a str, kind: SlaveKind<'a>| {
            if bus.masters.contains_key(name) || kinds.insert(name, kind).is_some() {
                Err(ConfigError::AmbiguousName(name.to_string()))
            } else {
                Ok(())
            }
        };
        for (name, switch) in &bus.switches {
            add(name, SlaveKind::Switch(switch))?;
        }
        for (name, bridge) in &bus.bridges {
            add(name, SlaveKind::Bridge(bridge))?;
        }
        for name in &bus.default_devices {
            add(name, SlaveKind::Default)?;
        }
        for name in &bus.endpoints {
            add(name, SlaveKind::Endpoint)?;
        }

        let mut ids: BTreeMap<SwitchId, &str> = BTreeMap::new();
        for (name, switch) in &bus.switches {
            if let Some(first) = ids.insert(switch.id, name) {
                return Err(ConfigError::DuplicateSwitchId {
                    id: switch.id,
                    first: first.to_string(),
                    second: name.clone(),
                });
            }
        }

        Ok(BusBuilder {
            kinds,
            built: BTreeMap::new(),
            in_progress: BTreeSet::new(),
            endpoints: BTreeMap::new(),
            transfers: Vec::new(),
        })
    }

    /// Returns the slave called `name`, building it (and everything
    /// below it) on first use.
    fn slave(&mut self, name: &str, owner: &str) -> Result<Arc<dyn Slave>, ConfigError> {
        if let Some(slave) = self.built.get(name) {
            return Ok(Arc::clone(slave));
        }
        let kind = *self
            .kinds
            .get(name)
            .ok_or_else(|| ConfigError::Missing {
                kind: ComponentKind::Slave,
                name: name.to_string(),
                owner: owner.to_string(),
            })?;
        if !self.in_progress.insert(name.to_string()) {
            return Err(ConfigError::CyclicBus(name.to_string()));
        }
        let owner = format!("bus component {name}");
        let slave: Arc<dyn Slave> = match kind {
            SlaveKind::Switch(desc) => {
                let default = self.slave(&desc.default, &owner)?;
                let mut switch = Switch::new(name, desc.id, default);
                for route in &desc.slaves {
                    let target = self.slave(&route.slave, &owner)?;
                    switch.connect(AddressRange::new(route.base, route.size), target)?;
                }
                let switch = Arc::new(switch);
                self.transfers.push(Arc::clone(&switch) as Arc<dyn Transfer>);
                switch
            }
            SlaveKind::Bridge(desc) => {
                let downstream = self.slave(&desc.slave, &owner)?;
                let mut bridge = Bridge::new(name, downstream);
                if let Some(transform) = &desc.transform {
                    let f = Bridge::named_transform(transform).ok_or_else(|| {
                        ConfigError::UnknownTransform {
                            bridge: name.to_string(),
                            transform: transform.clone(),
                        }
                    })?;
                    bridge = bridge.with_transform(f);
                }
                let bridge = Arc::new(bridge);
                self.transfers.push(Arc::clone(&bridge) as Arc<dyn Transfer>);
                bridge
            }
            SlaveKind::Default => {
                let device = Arc::new(DefaultDevice::new(name));
                self.transfers.push(Arc::clone(&device) as Arc<dyn Transfer>);
                device
            }
            SlaveKind::Endpoint => {
                let gate = Arc::new(DeviceGate::new());
                self.endpoints.insert(name.to_string(), Arc::clone(&gate));
                gate
            }
        };
        event!(Level::DEBUG, "built bus component {}", name);
        self.in_progress.remove(name);
        self.built.insert(name.to_string(), Arc::clone(&slave));
        Ok(slave)
    }

    fn build(mut self, bus: &BusDescription) -> Result<Fabric, ConfigError> {
        let mut roots: BTreeMap<String, Arc<dyn Root>> = BTreeMap::new();
        for (name, master) in &bus.masters {
            let slave = self.slave(&master.slave, &format!("bus master {name}"))?;
            roots.insert(name.clone(), Arc::new(CpuGate::new(slave)));
        }
        let names: Vec<String> = self.kinds.keys().map(|name| name.to_string()).collect();
        for name in names {
            self.slave(&name, "the bus")?;
        }
        Ok(Fabric {
            roots,
            endpoints: self.endpoints,
            transfers: self.transfers,
        })
    }
}

fn module_error(kind: ComponentKind, component: &str) -> impl FnOnce(ModuleError) -> ConfigError {
    let component = component.to_string();
    move |error| ConfigError::Module {
        kind,
        component,
        error,
    }
}

fn unknown_module(kind: ComponentKind, module: &str, component: &str) -> ConfigError {
    ConfigError::UnknownModule {
        kind,
        module: module.to_string(),
        component: component.to_string(),
    }
}

fn lookup<'m, T>(
    map: &'m BTreeMap<String, T>,
    kind: ComponentKind,
    name: &str,
    owner: &str,
) -> Result<&'m T, ConfigError> {
    map.get(name).ok_or_else(|| ConfigError::Missing {
        kind,
        name: name.to_string(),
        owner: owner.to_string(),
    })
}

fn build_cpu(
    name: &str,
    desc: &CpuDescription,
    modules: &ModuleRegistry,
    fabric: &Fabric,
    stop: &StopSignal,
) -> Result<Cpu, ConfigError> {
    let owner = format!("cpu {name}");

    let mut files = BTreeMap::new();
    let mut register_files = Vec::with_capacity(desc.registers.len());
    for (file_name, comp) in &desc.registers {
        let factory = modules
            .register_file(&comp.module)
            .ok_or_else(|| unknown_module(ComponentKind::RegisterFile, &comp.module, file_name))?;
        let file = factory(file_name, &comp.settings)
            .map_err(module_error(ComponentKind::RegisterFile, file_name))?;
        files.insert(file_name.clone(), register_files.len());
        register_files.push(file);
    }
    let bank = Arc::new(RegisterBank::new(register_files));

    let initial_pc: u32 = desc
        .control
        .settings
        .optional_uint("initial-pc")
        .map_err(ModuleError::from)
        .map_err(module_error(ComponentKind::Control, name))?
        .unwrap_or(0);
    let pc = ProgramCounter::new(initial_pc);

    let root = lookup(&fabric.roots, ComponentKind::Master, &desc.port.master, &owner)?;
    let port: Arc<dyn DataPort> = Arc::new(BusPort::new(Arc::clone(root), stop.clone()));

    let ctx = CpuContext {
        cpu: name.to_string(),
        bank: Arc::clone(&bank),
        files,
        pc: pc.clone(),
        port: Arc::clone(&port),
    };

    let mut forms: BTreeMap<String, Arc<dyn InstructionForm>> = BTreeMap::new();
    for (form_name, comp) in &desc.forms {
        let factory = modules
            .form(&comp.module)
            .ok_or_else(|| unknown_module(ComponentKind::Form, &comp.module, form_name))?;
        let form =
            factory(&ctx, &comp.settings).map_err(module_error(ComponentKind::Form, form_name))?;
        forms.insert(form_name.clone(), form);
    }

    let mut functors: BTreeMap<String, Arc<dyn InstructionFunctor>> = BTreeMap::new();
    for (functor_name, comp) in &desc.functors {
        let factory = modules
            .functor(&comp.module)
            .ok_or_else(|| unknown_module(ComponentKind::Functor, &comp.module, functor_name))?;
        let functor = factory(&ctx, &comp.settings)
            .map_err(module_error(ComponentKind::Functor, functor_name))?;
        functors.insert(functor_name.clone(), functor);
    }

    // Executors are numbered in name order.
    let ids: BTreeMap<String, ExecutorId> = desc
        .executors
        .keys()
        .enumerate()
        .map(|(n, executor_name)| (executor_name.clone(), ExecutorId(n)))
        .collect();

    let mut registry = InstructionRegistry::new(Arc::clone(&bank));
    for instruction in &desc.instructions {
        let form = lookup(&forms, ComponentKind::Form, &instruction.form, &owner)?;
        let functor = lookup(&functors, ComponentKind::Functor, &instruction.functor, &owner)?;
        let executor = lookup(&ids, ComponentKind::Executor, &instruction.executor, &owner)?;
        registry
            .register(
                instruction.opcode,
                Arc::clone(form),
                Arc::clone(functor),
                *executor,
            )
            .map_err(|error| ConfigError::Registry {
                cpu: name.to_string(),
                error,
            })?;
    }
    let registry = Arc::new(registry);

    let mut executors: Vec<Arc<dyn Executor>> = Vec::with_capacity(desc.executors.len());
    for (executor_name, comp) in &desc.executors {
        let factory = modules
            .executor(&comp.module)
            .ok_or_else(|| unknown_module(ComponentKind::Executor, &comp.module, executor_name))?;
        let ctx = ExecutorContext {
            name: executor_name.clone(),
            registry: Arc::clone(&registry),
        };
        let executor = factory(&ctx, &comp.settings)
            .map_err(module_error(ComponentKind::Executor, executor_name))?;
        executors.push(executor);
    }

    let own = *lookup(&ids, ComponentKind::Executor, &desc.control.executor, &owner)?;
    let control = ControlUnit::new(pc, registry, executors.clone(), own, port);
    event!(
        Level::INFO,
        "cpu {}: {} register files, {} instructions, {} executors, initial pc {:#010x}",
        name,
        bank.file_count(),
        desc.instructions.len(),
        executors.len(),
        initial_pc
    );
    Ok(Cpu::new(name, bank, control, executors))
}

/// A machine, built and ready to run.
pub struct Asic {
    cpus: Vec<Cpu>,
    transfers: Vec<Arc<dyn Transfer>>,
    peripherals: Vec<Box<dyn Peripheral>>,
    stop: StopSignal,
}

impl Asic {
    /// Builds every component of `desc` using the factories in
    /// `modules`.
    pub fn build(desc: &MachineDescription, modules: &ModuleRegistry) -> Result<Asic, ConfigError> {
        let span = span!(Level::INFO, "build");
        let _enter = span.enter();

        let stop = StopSignal::new();
        let fabric = BusBuilder::new(&desc.bus)?.build(&desc.bus)?;

        let cpus = desc
            .cpus
            .iter()
            .map(|(name, cpu)| build_cpu(name, cpu, modules, &fabric, &stop))
            .collect::<Result<Vec<Cpu>, ConfigError>>()?;

        let mut claimed: BTreeMap<&str, &str> = BTreeMap::new();
        let mut peripherals = Vec::with_capacity(desc.peripherals.len());
        for (name, p) in &desc.peripherals {
            let gate = lookup(
                &fabric.endpoints,
                ComponentKind::Endpoint,
                &p.endpoint,
                &format!("peripheral {name}"),
            )?;
            if let Some(first) = claimed.insert(&p.endpoint, name) {
                return Err(ConfigError::EndpointInUse {
                    endpoint: p.endpoint.clone(),
                    first: first.to_string(),
                    second: name.clone(),
                });
            }
            let factory = modules
                .peripheral(&p.module)
                .ok_or_else(|| unknown_module(ComponentKind::Peripheral, &p.module, name))?;
            let ctx = PeripheralContext {
                name: name.clone(),
                endpoint: Arc::clone(gate) as Arc<dyn Endpoint>,
            };
            peripherals.push(
                factory(&ctx, &p.settings).map_err(module_error(ComponentKind::Peripheral, name))?,
            );
        }

        event!(
            Level::INFO,
            "machine built: {} cpus, {} bus transfer devices, {} peripherals",
            cpus.len(),
            fabric.transfers.len(),
            peripherals.len()
        );
        Ok(Asic {
            cpus,
            transfers: fabric.transfers,
            peripherals,
            stop,
        })
    }

    #[must_use]
    pub fn cpus(&self) -> &[Cpu] {
        &self.cpus
    }

    #[must_use]
    pub fn cpu(&self, name: &str) -> Option<&Cpu> {
        self.cpus.iter().find(|cpu| cpu.name() == name)
    }

    #[must_use]
    pub fn transfer_count(&self) -> usize {
        self.transfers.len()
    }

    #[must_use]
    pub fn peripheral_count(&self) -> usize {
        self.peripherals.len()
    }

    /// The stop signal shared by every thread of the machine.
    /// Raising it from outside stops a run early.
    #[must_use]
    pub fn stop(&self) -> &StopSignal {
        &self.stop
    }

    pub(crate) fn parts_mut(
        &mut self,
    ) -> (
        &mut [Cpu],
        &[Arc<dyn Transfer>],
        &mut [Box<dyn Peripheral>],
    ) {
        (&mut self.cpus, &self.transfers, &mut self.peripherals)
    }
}

impl Debug for Asic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asic")
            .field("cpus", &self.cpus)
            .field(
                "transfers",
                &self.transfers.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field(
                "peripherals",
                &self.peripherals.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("stop", &self.stop)
            .finish()
    }
}
