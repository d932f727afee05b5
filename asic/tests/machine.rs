use std::io::Write;
use std::time::Duration;

use serde_json::{json, Value};

use asic::rv32::{encode, opcode};
use asic::*;
use base::{InstructionWord, Settings};

const LOAD_ADDRESS: u32 = 0x100;

/// Writes `program` to a temporary file in the form the RAM module
/// loads as an image.
fn image_file(program: &[InstructionWord]) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".bin")
        .tempfile()
        .expect("should be able to create a temporary file");
    file.write_all(&encode::image(program))
        .expect("should be able to write the program image");
    file
}

fn rv32_cpu(port: &str, executor_module: &str, initial_pc: u32) -> Value {
    let form = |module: &str| json!({ "module": module, "settings": { "register-file": "x" } });
    json!({
        "registers": {
            "x": { "module": "registers-x32", "settings": { "count": 32, "zero-id": 0 } }
        },
        "forms": {
            "r": form("rv32-r"), "i": form("rv32-i"), "s": form("rv32-s"),
            "b": form("rv32-b"), "u": form("rv32-u"), "j": form("rv32-j")
        },
        "functors": {
            "op": { "module": "rv32-op" },
            "op-imm": { "module": "rv32-op-imm" },
            "lui": { "module": "rv32-lui" },
            "auipc": { "module": "rv32-auipc" },
            "jal": { "module": "rv32-jal" },
            "jalr": { "module": "rv32-jalr" },
            "branch": { "module": "rv32-branch" },
            "load": { "module": "rv32-load" },
            "store": { "module": "rv32-store" }
        },
        "executors": {
            "main": { "module": executor_module }
        },
        "instructions": [
            { "opcode": "0x33", "form": "r", "functor": "op", "executor": "main" },
            { "opcode": "0x13", "form": "i", "functor": "op-imm", "executor": "main" },
            { "opcode": "0x37", "form": "u", "functor": "lui", "executor": "main" },
            { "opcode": "0x17", "form": "u", "functor": "auipc", "executor": "main" },
            { "opcode": "0x6f", "form": "j", "functor": "jal", "executor": "main" },
            { "opcode": "0x67", "form": "i", "functor": "jalr", "executor": "main" },
            { "opcode": "0x63", "form": "b", "functor": "branch", "executor": "main" },
            { "opcode": "0x03", "form": "i", "functor": "load", "executor": "main" },
            { "opcode": "0x23", "form": "s", "functor": "store", "executor": "main" }
        ],
        "port": { "master": port },
        "control": { "executor": "main", "settings": { "initial-pc": initial_pc } }
    })
}

/// One RV32 CPU and 4KiB of RAM at address zero, holding `image` at
/// `LOAD_ADDRESS`.
fn single_cpu_machine(image: &tempfile::NamedTempFile, executor_module: &str) -> Value {
    json!({
        "cpus": { "core0": rv32_cpu("core0-port", executor_module, LOAD_ADDRESS) },
        "bus": {
            "masters": { "core0-port": { "slave": "top" } },
            "switches": {
                "top": {
                    "id": 1,
                    "default": "unmapped",
                    "slaves": [ { "base": 0, "size": "0x1000", "slave": "ram-gate" } ]
                }
            },
            "default_devices": [ "unmapped" ],
            "endpoints": [ "ram-gate" ]
        },
        "peripherals": {
            "ram": {
                "module": "ram",
                "endpoint": "ram-gate",
                "settings": {
                    "size": 4096,
                    "image": image.path().to_string_lossy(),
                    "image-offset": LOAD_ADDRESS
                }
            }
        }
    })
}

fn build(desc: &Value) -> Result<Asic, ConfigError> {
    let desc = MachineDescription::from_json_str(&desc.to_string())?;
    Asic::build(&desc, &ModuleRegistry::with_builtin_modules())
}

fn registers(asic: &Asic, cpu: &str) -> Vec<u32> {
    asic.cpu(cpu)
        .expect("cpu should exist")
        .bank()
        .snapshot(0)
        .expect("register file x should exist")
}

/// Adds up 10 + 9 + ... + 1, stores the total, reads it back and
/// then exercises the remaining instruction groups before halting.
fn summing_program() -> Vec<InstructionWord> {
    use opcode::*;
    vec![
        encode::i(OP_IMM, 1, 0, 0, 10),      // 0x100 addi x1, x0, 10
        encode::i(OP_IMM, 2, 0, 0, 0),       // 0x104 addi x2, x0, 0
        encode::r(OP, 2, 0, 2, 1, 0),        // 0x108 add x2, x2, x1
        encode::i(OP_IMM, 1, 0, 1, -1),      // 0x10c addi x1, x1, -1
        encode::b(BRANCH, 1, 1, 0, -8),      // 0x110 bne x1, x0, 0x108
        encode::i(OP_IMM, 3, 0, 0, 0x700),   // 0x114 addi x3, x0, 0x700
        encode::s(STORE, 2, 3, 2, 0x100),    // 0x118 sw x2, 0x100(x3)
        encode::i(LOAD, 4, 2, 3, 0x100),     // 0x11c lw x4, 0x100(x3)
        encode::u(LUI, 6, 0x12345),          // 0x120 lui x6, 0x12345
        encode::u(AUIPC, 7, 0),              // 0x124 auipc x7, 0
        encode::j(JAL, 8, 8),                // 0x128 jal x8, 0x130
        encode::i(OP_IMM, 9, 0, 0, 99),      // 0x12c addi x9, x0, 99 (skipped)
        encode::i(JALR, 0, 0, 0, 0),         // 0x130 jalr x0, 0(x0): halt
    ]
}

fn check_summing_program(executor_module: &str) {
    let image = image_file(&summing_program());
    let mut asic =
        build(&single_cpu_machine(&image, executor_module)).expect("machine should build");
    let report = Runner::new()
        .with_deadline(Duration::from_secs(30))
        .run(&mut asic)
        .expect("program should run to completion");

    let core = report.cpu("core0").expect("core0 is reported");
    assert!(core.completed);
    assert_eq!(core.pc, 0);

    let x = registers(&asic, "core0");
    assert_eq!(x[0], 0);
    assert_eq!(x[1], 0);
    assert_eq!(x[2], 55);
    assert_eq!(x[3], 0x700);
    assert_eq!(x[4], 55);
    assert_eq!(x[6], 0x1234_5000);
    assert_eq!(x[7], 0x124);
    assert_eq!(x[8], 0x12c);
    assert_eq!(x[9], 0);
}

#[test]
fn test_program_runs_on_in_order_executor() {
    check_summing_program("in-order-executor");
}

#[test]
fn test_program_runs_on_out_of_order_executor() {
    check_summing_program("out-of-order-executor");
}

#[test]
fn test_two_cpus_share_memory() {
    use opcode::*;
    // One image holds both programs: core0's at 0x100 and core1's at
    // 0x200.
    let nop = encode::i(OP_IMM, 0, 0, 0, 0);
    let mut program = vec![nop; 0x40];
    program[0] = encode::i(OP_IMM, 1, 0, 0, 7); // addi x1, x0, 7
    program[1] = encode::i(JALR, 0, 0, 0, 0);
    program.extend([
        encode::i(OP_IMM, 1, 0, 0, 3), // addi x1, x0, 3
        encode::r(OP, 1, 1, 1, 1, 0),  // sll x1, x1, x1
        encode::i(JALR, 0, 0, 0, 0),
    ]);
    let image = image_file(&program);

    let mut desc = single_cpu_machine(&image, "in-order-executor");
    desc["cpus"]["core1"] = rv32_cpu("core1-port", "out-of-order-executor", 0x200);
    desc["bus"]["masters"]["core1-port"] = json!({ "slave": "top" });
    let mut asic = build(&desc).expect("machine should build");
    assert_eq!(asic.cpus().len(), 2);

    let report = Runner::new()
        .with_deadline(Duration::from_secs(30))
        .run(&mut asic)
        .expect("both programs should complete");
    assert!(report.cpus.iter().all(|cpu| cpu.completed));
    assert_eq!(registers(&asic, "core0")[1], 7);
    assert_eq!(registers(&asic, "core1")[1], 24);
}

#[test]
fn test_unsupported_instruction_stops_the_machine() {
    use opcode::*;
    let image = image_file(&[
        encode::i(OP_IMM, 1, 0, 0, 6),
        encode::r(OP, 2, 0, 1, 1, 0x01), // mul x2, x1, x1
        encode::i(JALR, 0, 0, 0, 0),
    ]);
    let mut asic =
        build(&single_cpu_machine(&image, "in-order-executor")).expect("machine should build");
    match Runner::new().with_deadline(Duration::from_secs(30)).run(&mut asic) {
        Err(RunError::ThreadFailed(reason)) => {
            assert!(
                reason.starts_with("Got exception from cpu core0: "),
                "unexpected reason {reason}"
            );
            assert!(
                reason.contains("rv32-op does not support minor opcode 0x0 with sub-minor opcode 0x1"),
                "unexpected reason {reason}"
            );
        }
        other => panic!("expected a thread failure, got {other:?}"),
    }
    assert!(asic.stop().is_stopped());
    assert_eq!(registers(&asic, "core0")[1], 6);
    assert_eq!(
        Runner::new().run(&mut asic).map(|_| ()),
        Err(RunError::AlreadyStopped)
    );
}

#[test]
fn test_unregistered_opcode_stops_the_machine() {
    // The RAM beyond the program is zero, and opcode zero is not
    // registered.
    let image = image_file(&[encode::i(opcode::OP_IMM, 1, 0, 0, 1)]);
    let mut asic =
        build(&single_cpu_machine(&image, "in-order-executor")).expect("machine should build");
    match Runner::new().run(&mut asic) {
        Err(RunError::ThreadFailed(reason)) => assert!(
            reason.contains("instruction with opcode 0x00 is not registered"),
            "unexpected reason {reason}"
        ),
        other => panic!("expected a thread failure, got {other:?}"),
    }
}

#[test]
fn test_deadline() {
    use opcode::*;
    let image = image_file(&[
        encode::j(JAL, 0, 4),  // 0x100 jal x0, 0x104
        encode::j(JAL, 0, -4), // 0x104 jal x0, 0x100
    ]);
    let mut asic =
        build(&single_cpu_machine(&image, "in-order-executor")).expect("machine should build");
    let deadline = Duration::from_millis(50);
    assert_eq!(
        Runner::new().with_deadline(deadline).run(&mut asic),
        Err(RunError::DeadlineExceeded(deadline))
    );
}

#[derive(Debug)]
struct Broken {
    name: String,
}

impl Peripheral for Broken {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&mut self) -> Result<(), PeripheralError> {
        Err(PeripheralError("out of order".to_string()))
    }
}

fn make_broken(
    ctx: &PeripheralContext,
    _settings: &Settings,
) -> Result<Box<dyn Peripheral>, ModuleError> {
    Ok(Box::new(Broken {
        name: ctx.name.clone(),
    }))
}

#[test]
fn test_failing_peripheral_stops_the_machine() {
    let image = image_file(&[encode::j(opcode::JAL, 0, 4), encode::j(opcode::JAL, 0, -4)]);
    let mut desc = single_cpu_machine(&image, "in-order-executor");
    desc["bus"]["endpoints"] = json!(["ram-gate", "broken-gate"]);
    desc["peripherals"]["fault"] = json!({ "module": "broken", "endpoint": "broken-gate" });
    let desc = MachineDescription::from_json_str(&desc.to_string()).expect("valid description");

    let mut modules = ModuleRegistry::with_builtin_modules();
    modules.add_peripheral("broken", make_broken);
    let mut asic = Asic::build(&desc, &modules).expect("machine should build");
    assert_eq!(
        Runner::new().with_deadline(Duration::from_secs(30)).run(&mut asic),
        Err(RunError::ThreadFailed(
            "Got exception from peripheral fault: out of order".to_string()
        ))
    );
}

fn config_error(edit: impl FnOnce(&mut Value)) -> ConfigError {
    let image = image_file(&[encode::i(opcode::JALR, 0, 0, 0, 0)]);
    let mut desc = single_cpu_machine(&image, "in-order-executor");
    edit(&mut desc);
    match build(&desc) {
        Ok(asic) => panic!("expected a configuration error, built {asic:?}"),
        Err(e) => e,
    }
}

#[test]
fn test_missing_form() {
    let e = config_error(|desc| {
        desc["cpus"]["core0"]["instructions"][0]["form"] = json!("nope");
    });
    assert_eq!(
        e.to_string(),
        "no instruction form with name `nope` registered for cpu core0"
    );
}

#[test]
fn test_unknown_module() {
    let e = config_error(|desc| {
        desc["cpus"]["core0"]["executors"]["main"]["module"] = json!("superscalar");
    });
    assert!(matches!(
        e,
        ConfigError::UnknownModule {
            kind: ComponentKind::Executor,
            ..
        }
    ));
}

#[test]
fn test_duplicate_opcode() {
    let e = config_error(|desc| {
        let extra = json!({ "opcode": 0x33, "form": "r", "functor": "op", "executor": "main" });
        desc["cpus"]["core0"]["instructions"]
            .as_array_mut()
            .expect("instructions are a list")
            .push(extra);
    });
    assert!(matches!(e, ConfigError::Registry { .. }), "got {e}");
}

#[test]
fn test_bad_register_file_settings() {
    let e = config_error(|desc| {
        desc["cpus"]["core0"]["registers"]["x"]["settings"]["zero-id"] = json!(32);
    });
    assert!(matches!(
        e,
        ConfigError::Module {
            kind: ComponentKind::RegisterFile,
            ..
        }
    ));
}

#[test]
fn test_misaligned_route() {
    let e = config_error(|desc| {
        desc["bus"]["switches"]["top"]["slaves"][0]["base"] = json!(2);
    });
    assert!(matches!(e, ConfigError::Connect(_)), "got {e}");
}

#[test]
fn test_cyclic_bus() {
    let e = config_error(|desc| {
        desc["bus"]["bridges"] = json!({ "loop": { "slave": "top" } });
        desc["bus"]["switches"]["top"]["default"] = json!("loop");
    });
    assert!(matches!(e, ConfigError::CyclicBus(_)), "got {e}");
}

#[test]
fn test_endpoint_claimed_twice() {
    let e = config_error(|desc| {
        desc["peripherals"]["ram2"] =
            json!({ "module": "ram", "endpoint": "ram-gate", "settings": { "size": 16 } });
    });
    assert!(matches!(e, ConfigError::EndpointInUse { .. }), "got {e}");
}

#[test]
fn test_missing_image() {
    let e = config_error(|desc| {
        desc["peripherals"]["ram"]["settings"]["image"] = json!("/nonexistent/program.bin");
    });
    assert!(matches!(
        e,
        ConfigError::Module {
            kind: ComponentKind::Peripheral,
            error: ModuleError::Io { .. },
            ..
        }
    ));
}

/// Maps `slave` at `base` on the machine's only switch.
fn add_route(desc: &mut Value, base: u32, size: u32, slave: &str) {
    desc["bus"]["switches"]["top"]["slaves"]
        .as_array_mut()
        .expect("routes are a list")
        .push(json!({ "base": base, "size": size, "slave": slave }));
}

fn add_endpoint(desc: &mut Value, endpoint: &str) {
    desc["bus"]["endpoints"]
        .as_array_mut()
        .expect("endpoints are a list")
        .push(json!(endpoint));
}

#[test]
fn test_program_writes_to_uart() {
    use opcode::*;
    let image = image_file(&[
        encode::u(LUI, 3, 1),                     // lui x3, 0x1: the UART
        encode::i(OP_IMM, 1, 0, 0, i32::from(b'h')),
        encode::s(STORE, 2, 3, 1, 4),             // sw x1, 4(x3)
        encode::i(OP_IMM, 1, 0, 0, i32::from(b'i')),
        encode::s(STORE, 2, 3, 1, 4),
        encode::i(OP_IMM, 1, 0, 0, i32::from(b'\n')),
        encode::s(STORE, 2, 3, 1, 4),
        // Reading the status register cannot overtake the stores.
        encode::i(LOAD, 5, 2, 3, 0),              // lw x5, 0(x3)
        encode::i(JALR, 0, 0, 0, 0),
    ]);
    let output = tempfile::NamedTempFile::new().expect("should be able to create a temporary file");

    let mut desc = single_cpu_machine(&image, "in-order-executor");
    add_route(&mut desc, 0x1000, 0x10, "uart-gate");
    add_endpoint(&mut desc, "uart-gate");
    desc["peripherals"]["console"] = json!({
        "module": "file-uart",
        "endpoint": "uart-gate",
        "settings": { "output": output.path().to_string_lossy() }
    });
    let mut asic = build(&desc).expect("machine should build");
    assert_eq!(asic.peripheral_count(), 2);
    Runner::new()
        .with_deadline(Duration::from_secs(30))
        .run(&mut asic)
        .expect("program should run to completion");

    assert_eq!(registers(&asic, "core0")[5], uart::TX_IDLE);
    assert_eq!(
        std::fs::read_to_string(output.path()).expect("UART output should be readable"),
        "hi\n"
    );
}

#[test]
fn test_bridge_swaps_bytes() {
    use opcode::*;
    let image = image_file(&[
        encode::u(LUI, 3, 1),                 // lui x3, 0x1: behind the bridge
        encode::i(LOAD, 4, 2, 3, 0),          // lw x4, 0(x3)
        encode::i(OP_IMM, 5, 0, 0, 0x123),
        encode::s(STORE, 2, 3, 5, 4),         // sw x5, 4(x3)
        encode::i(LOAD, 6, 2, 3, 4),          // lw x6, 4(x3)
        encode::i(JALR, 0, 0, 0, 0),
    ]);
    let mut data = tempfile::NamedTempFile::new().expect("should be able to create a temporary file");
    data.write_all(&[0x44, 0x33, 0x22, 0x11])
        .expect("should be able to write the data image");

    let mut desc = single_cpu_machine(&image, "in-order-executor");
    add_route(&mut desc, 0x1000, 0x100, "swap");
    desc["bus"]["bridges"] =
        json!({ "swap": { "slave": "data-gate", "transform": "byte-swap" } });
    add_endpoint(&mut desc, "data-gate");
    desc["peripherals"]["data"] = json!({
        "module": "ram",
        "endpoint": "data-gate",
        "settings": { "size": 256, "image": data.path().to_string_lossy() }
    });
    let mut asic = build(&desc).expect("machine should build");
    Runner::new()
        .with_deadline(Duration::from_secs(30))
        .run(&mut asic)
        .expect("program should run to completion");

    let x = registers(&asic, "core0");
    assert_eq!(x[4], 0x4433_2211);
    // Swapped on the way in and again on the way out.
    assert_eq!(x[6], 0x123);
}

#[test]
fn test_write_to_unmapped_address_does_not_hold_up_reads() {
    use opcode::*;
    let program = vec![
        encode::u(LUI, 3, 2),                 // lui x3, 0x2: nothing is there
        encode::i(OP_IMM, 1, 0, 0, 5),
        encode::s(STORE, 2, 3, 1, 0),         // sw x1, 0(x3)
        encode::i(LOAD, 4, 2, 0, 0x100),      // lw x4, 0x100(x0)
        encode::i(LOAD, 5, 2, 0, 0x104),      // lw x5, 0x104(x0)
        encode::i(JALR, 0, 0, 0, 0),
    ];
    let image = image_file(&program);
    let mut asic =
        build(&single_cpu_machine(&image, "out-of-order-executor")).expect("machine should build");
    Runner::new()
        .with_deadline(Duration::from_secs(30))
        .run(&mut asic)
        .expect("program should run to completion");

    let x = registers(&asic, "core0");
    assert_eq!(x[4], program[0].bits());
    assert_eq!(x[5], program[1].bits());
}

#[test]
fn test_slave_mapped_twice_on_one_switch() {
    let e = config_error(|desc| add_route(desc, 0x2000, 0x100, "ram-gate"));
    assert!(
        matches!(e, ConfigError::Connect(bus::ConnectError::AlreadyConnected { .. })),
        "got {e}"
    );
}

#[test]
fn test_unknown_bridge_transform() {
    let e = config_error(|desc| {
        add_route(desc, 0x2000, 0x100, "odd");
        desc["bus"]["bridges"] = json!({ "odd": { "slave": "extra", "transform": "rot13" } });
        add_endpoint(desc, "extra");
    });
    assert_eq!(
        e.to_string(),
        "bridge odd uses unknown payload transform rot13"
    );
}
