//! The module registry: named factories for every pluggable kind of
//! component.
//!
//! A machine description names a module for each register file,
//! instruction form, instruction functor, executor and peripheral.
//! The loader looks the module up here, exactly once per component,
//! and calls its factory with the component's settings and a context
//! giving access to what has already been built.
//!
//! The registry is an ordinary value.  [`ModuleRegistry::with_builtin_modules`]
//! provides everything in this crate; callers may add their own
//! modules before loading a machine.
use std::collections::BTreeMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use base::Settings;
use bus::Endpoint;
use cpu::{
    DataPort, Executor, FileId, InOrderExecutor, InstructionForm, InstructionFunctor,
    InstructionRegistry, OutOfOrderExecutor, ProgramCounter, RegisterBank, RegisterFile,
};

use super::error::{ComponentKind, ModuleError};
use super::peripheral::Peripheral;
use super::ram::Ram;
use super::rv32;
use super::uart::Uart;

/// What a form or functor factory can see of the CPU being built.
pub struct CpuContext {
    pub cpu: String,
    pub bank: Arc<RegisterBank>,
    pub files: BTreeMap<String, FileId>,
    pub pc: ProgramCounter,
    pub port: Arc<dyn DataPort>,
}

impl CpuContext {
    pub fn register_file(&self, name: &str) -> Result<FileId, ModuleError> {
        self.files
            .get(name)
            .copied()
            .ok_or_else(|| ModuleError::NoSuchRegisterFile(name.to_string()))
    }
}

impl Debug for CpuContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuContext")
            .field("cpu", &self.cpu)
            .field("files", &self.files)
            .field("pc", &self.pc)
            .finish_non_exhaustive()
    }
}

pub struct ExecutorContext {
    /// The executor's own name.
    pub name: String,
    pub registry: Arc<InstructionRegistry>,
}

pub struct PeripheralContext {
    pub name: String,
    pub endpoint: Arc<dyn Endpoint>,
}

pub type RegisterFileFactory = fn(&str, &Settings) -> Result<RegisterFile, ModuleError>;
pub type FormFactory = fn(&CpuContext, &Settings) -> Result<Arc<dyn InstructionForm>, ModuleError>;
pub type FunctorFactory =
    fn(&CpuContext, &Settings) -> Result<Arc<dyn InstructionFunctor>, ModuleError>;
pub type ExecutorFactory = fn(&ExecutorContext, &Settings) -> Result<Arc<dyn Executor>, ModuleError>;
pub type PeripheralFactory =
    fn(&PeripheralContext, &Settings) -> Result<Box<dyn Peripheral>, ModuleError>;

#[derive(Default)]
pub struct ModuleRegistry {
    register_files: BTreeMap<String, RegisterFileFactory>,
    forms: BTreeMap<String, FormFactory>,
    functors: BTreeMap<String, FunctorFactory>,
    executors: BTreeMap<String, ExecutorFactory>,
    peripherals: BTreeMap<String, PeripheralFactory>,
}

/// A 32-bit register file.  `count` registers, of which `zero-id`
/// (if given) is hard-wired to zero.
fn make_registers_x32(name: &str, settings: &Settings) -> Result<RegisterFile, ModuleError> {
    let count: usize = settings.uint("count")?;
    if count == 0 {
        return Err(ModuleError::Invalid(
            "a register file must have at least one register".to_string(),
        ));
    }
    let zero: Option<usize> = settings.optional_uint("zero-id")?;
    if let Some(z) = zero {
        if z >= count {
            return Err(ModuleError::Invalid(format!(
                "zero register {z} is outside the file (which has {count} registers)"
            )));
        }
    }
    Ok(RegisterFile::new(name, count, zero))
}

fn make_in_order_executor(
    ctx: &ExecutorContext,
    _settings: &Settings,
) -> Result<Arc<dyn Executor>, ModuleError> {
    Ok(Arc::new(InOrderExecutor::new(
        &ctx.name,
        Arc::clone(&ctx.registry),
    )))
}

fn make_out_of_order_executor(
    ctx: &ExecutorContext,
    _settings: &Settings,
) -> Result<Arc<dyn Executor>, ModuleError> {
    Ok(Arc::new(OutOfOrderExecutor::new(
        &ctx.name,
        Arc::clone(&ctx.registry),
    )))
}

fn make_ram(ctx: &PeripheralContext, settings: &Settings) -> Result<Box<dyn Peripheral>, ModuleError> {
    Ok(Box::new(Ram::from_settings(
        &ctx.name,
        Arc::clone(&ctx.endpoint),
        settings,
    )?))
}

fn make_file_uart(
    ctx: &PeripheralContext,
    settings: &Settings,
) -> Result<Box<dyn Peripheral>, ModuleError> {
    Ok(Box::new(Uart::to_file(
        &ctx.name,
        Arc::clone(&ctx.endpoint),
        settings,
    )?))
}

fn make_stdio_uart(
    ctx: &PeripheralContext,
    _settings: &Settings,
) -> Result<Box<dyn Peripheral>, ModuleError> {
    Ok(Box::new(Uart::on_stdio(&ctx.name, Arc::clone(&ctx.endpoint))?))
}

impl ModuleRegistry {
    /// A registry with no modules at all.
    #[must_use]
    pub fn new() -> ModuleRegistry {
        ModuleRegistry::default()
    }

    #[must_use]
    pub fn with_builtin_modules() -> ModuleRegistry {
        let mut modules = ModuleRegistry::new();
        modules.add_register_file("registers-x32", make_registers_x32);
        modules.add_executor("in-order-executor", make_in_order_executor);
        modules.add_executor("out-of-order-executor", make_out_of_order_executor);
        modules.add_peripheral("ram", make_ram);
        modules.add_peripheral("file-uart", make_file_uart);
        modules.add_peripheral("stdio-uart", make_stdio_uart);
        rv32::register_modules(&mut modules);
        modules
    }

    /// Adds a module, replacing any existing module of the same kind
    /// and name.
    pub fn add_register_file(&mut self, module: &str, factory: RegisterFileFactory) {
        self.register_files.insert(module.to_string(), factory);
    }

    pub fn add_form(&mut self, module: &str, factory: FormFactory) {
        self.forms.insert(module.to_string(), factory);
    }

    pub fn add_functor(&mut self, module: &str, factory: FunctorFactory) {
        self.functors.insert(module.to_string(), factory);
    }

    pub fn add_executor(&mut self, module: &str, factory: ExecutorFactory) {
        self.executors.insert(module.to_string(), factory);
    }

    pub fn add_peripheral(&mut self, module: &str, factory: PeripheralFactory) {
        self.peripherals.insert(module.to_string(), factory);
    }

    #[must_use]
    pub fn register_file(&self, module: &str) -> Option<RegisterFileFactory> {
        self.register_files.get(module).copied()
    }

    #[must_use]
    pub fn form(&self, module: &str) -> Option<FormFactory> {
        self.forms.get(module).copied()
    }

    #[must_use]
    pub fn functor(&self, module: &str) -> Option<FunctorFactory> {
        self.functors.get(module).copied()
    }

    #[must_use]
    pub fn executor(&self, module: &str) -> Option<ExecutorFactory> {
        self.executors.get(module).copied()
    }

    #[must_use]
    pub fn peripheral(&self, module: &str) -> Option<PeripheralFactory> {
        self.peripherals.get(module).copied()
    }

    /// The names of the modules of one kind.  Bus components are not
    /// pluggable, so their kinds have no modules.
    #[must_use]
    pub fn module_names(&self, kind: ComponentKind) -> Vec<&str> {
        fn names<T>(m: &BTreeMap<String, T>) -> Vec<&str> {
            m.keys().map(String::as_str).collect()
        }
        match kind {
            ComponentKind::RegisterFile => names(&self.register_files),
            ComponentKind::Form => names(&self.forms),
            ComponentKind::Functor => names(&self.functors),
            ComponentKind::Executor => names(&self.executors),
            ComponentKind::Peripheral => names(&self.peripherals),
            ComponentKind::Control
            | ComponentKind::Master
            | ComponentKind::Slave
            | ComponentKind::Endpoint => Vec::new(),
        }
    }
}

impl Debug for ModuleRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("register_files", &self.module_names(ComponentKind::RegisterFile))
            .field("forms", &self.module_names(ComponentKind::Form))
            .field("functors", &self.module_names(ComponentKind::Functor))
            .field("executors", &self.module_names(ComponentKind::Executor))
            .field("peripherals", &self.module_names(ComponentKind::Peripheral))
            .finish()
    }
}

#[test]
fn test_builtin_modules() {
    let modules = ModuleRegistry::with_builtin_modules();
    assert_eq!(
        modules.module_names(ComponentKind::Executor),
        vec!["in-order-executor", "out-of-order-executor"]
    );
    assert_eq!(
        modules.module_names(ComponentKind::Peripheral),
        vec!["file-uart", "ram", "stdio-uart"]
    );
    assert!(modules.form("rv32-r").is_some());
    assert!(modules.functor("rv32-store").is_some());
    assert!(modules.form("rv64-r").is_none());
    assert!(modules.module_names(ComponentKind::Slave).is_empty());
    assert!(ModuleRegistry::new()
        .module_names(ComponentKind::Form)
        .is_empty());
}

#[test]
fn test_register_file_settings() {
    use base::SettingValue;

    let file = make_registers_x32(
        "x",
        &Settings::new()
            .with("count", SettingValue::Int(8))
            .with("zero-id", SettingValue::Int(0)),
    )
    .expect("valid settings");
    assert_eq!(file.len(), 8);
    assert_eq!(file.zero_register(), Some(0));

    assert!(matches!(
        make_registers_x32("x", &Settings::new()),
        Err(ModuleError::Settings(_))
    ));
    assert!(matches!(
        make_registers_x32(
            "x",
            &Settings::new()
                .with("count", SettingValue::Int(4))
                .with("zero-id", SettingValue::Int(4))
        ),
        Err(ModuleError::Invalid(_))
    ));
    assert!(matches!(
        make_registers_x32("x", &Settings::new().with("count", SettingValue::Int(-1))),
        Err(ModuleError::Settings(_))
    ));
}
