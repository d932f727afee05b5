//! Runs a machine to completion.
//!
//! Each CPU gets a thread of its own, which steps it until the stop
//! signal is raised.  A single further thread moves packets through
//! the bus, calling `transfer()` on every switch, bridge and default
//! device in turn, and each peripheral gets a thread calling
//! `handle()`.  None of these loops ever waits; they all poll.
//!
//! The calling thread watches the CPUs.  When every CPU has halted,
//! or a thread fails, or the deadline passes, it raises the stop
//! signal and joins everything.  A thread which fails records why,
//! and only the first such reason is reported.
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use std::thread::{self, ScopedJoinHandle};
use std::time::{Duration, Instant};

use tracing::{event, span, Level};

use base::{Address, StopSignal};
use bus::Transfer;
use cpu::{Cpu, CpuMonitor};

use super::error::RunError;
use super::loader::Asic;
use super::peripheral::Peripheral;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

fn record_failure(stop: &StopSignal, reason: String) {
    if stop.fail(reason.clone()) {
        event!(Level::ERROR, "{}", reason);
    } else {
        // Something else stopped the machine first; this failure is
        // most likely a consequence of that.
        event!(Level::DEBUG, "after stop: {}", reason);
    }
}

fn run_cpu(cpu: &mut Cpu, stop: &StopSignal) {
    let span = span!(Level::INFO, "cpu", name = cpu.name());
    let _enter = span.enter();
    while !stop.is_stopped() {
        if let Err(e) = cpu.step() {
            record_failure(stop, format!("Got exception from cpu {}: {e}", cpu.name()));
            return;
        }
    }
}

fn run_transfers(transfers: &[Arc<dyn Transfer>], stop: &StopSignal) {
    let span = span!(Level::INFO, "bus");
    let _enter = span.enter();
    while !stop.is_stopped() {
        for device in transfers {
            if let Err(e) = device.transfer() {
                record_failure(
                    stop,
                    format!("Got exception from bus device {}: {e}", device.name()),
                );
                return;
            }
        }
    }
}

fn run_peripheral(peripheral: &mut dyn Peripheral, stop: &StopSignal) {
    let span = span!(Level::INFO, "peripheral", name = peripheral.name());
    let _enter = span.enter();
    while !stop.is_stopped() {
        if let Err(e) = peripheral.handle() {
            record_failure(
                stop,
                format!("Got exception from peripheral {}: {e}", peripheral.name()),
            );
            return;
        }
    }
}

/// The final state of one CPU.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpuReport {
    pub name: String,
    pub completed: bool,
    pub pc: Address,
}

/// What a successful run did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    pub elapsed: Duration,
    pub cpus: Vec<CpuReport>,
}

impl RunReport {
    #[must_use]
    pub fn cpu(&self, name: &str) -> Option<&CpuReport> {
        self.cpus.iter().find(|r| r.name == name)
    }
}

enum Outcome {
    Completed,
    Stopped,
    ThreadExited,
    DeadlineExceeded(Duration),
}

#[derive(Clone, Copy)]
pub struct Runner {
    deadline: Option<Duration>,
    poll_interval: Duration,
}

impl Default for Runner {
    fn default() -> Runner {
        Runner {
            deadline: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl Runner {
    #[must_use]
    pub fn new() -> Runner {
        Runner::default()
    }

    /// Gives up (with [`RunError::DeadlineExceeded`]) if the CPUs have
    /// not all halted after `deadline`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Runner {
        self.deadline = Some(deadline);
        self
    }

    /// How often the calling thread checks for completion.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Runner {
        self.poll_interval = interval;
        self
    }

    fn wait_for_completion(
        &self,
        monitors: &[CpuMonitor],
        handles: &[(String, ScopedJoinHandle<'_, ()>)],
        stop: &StopSignal,
        started: Instant,
    ) -> Outcome {
        loop {
            if stop.is_stopped() {
                return Outcome::Stopped;
            }
            if monitors.iter().all(CpuMonitor::is_completed) {
                return Outcome::Completed;
            }
            // Threads only leave their loops once the machine is
            // stopped, so one which has finished already panicked.
            if handles.iter().any(|(_, h)| h.is_finished()) {
                return Outcome::ThreadExited;
            }
            if let Some(deadline) = self.deadline {
                if started.elapsed() >= deadline {
                    return Outcome::DeadlineExceeded(deadline);
                }
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Runs `asic` until every CPU has halted.  A machine can only be
    /// run once, since the stop signal stays raised afterwards.
    pub fn run(&self, asic: &mut Asic) -> Result<RunReport, RunError> {
        let stop = asic.stop().clone();
        if stop.is_stopped() {
            return Err(RunError::AlreadyStopped);
        }
        let monitors: Vec<CpuMonitor> = asic.cpus().iter().map(Cpu::monitor).collect();
        event!(Level::INFO, "starting {} cpus", monitors.len());
        let started = Instant::now();

        let (cpus, transfers, peripherals) = asic.parts_mut();
        let (outcome, panicked) = thread::scope(|scope| {
            let mut handles = Vec::new();
            for cpu in cpus.iter_mut() {
                let stop = &stop;
                handles.push((
                    format!("cpu {}", cpu.name()),
                    scope.spawn(move || run_cpu(cpu, stop)),
                ));
            }
            if !transfers.is_empty() {
                let stop = &stop;
                handles.push((
                    "bus".to_string(),
                    scope.spawn(move || run_transfers(transfers, stop)),
                ));
            }
            for peripheral in peripherals.iter_mut() {
                let stop = &stop;
                handles.push((
                    format!("peripheral {}", peripheral.name()),
                    scope.spawn(move || run_peripheral(peripheral.as_mut(), stop)),
                ));
            }

            let outcome = self.wait_for_completion(&monitors, &handles, &stop, started);
            stop.request_stop();
            let mut panicked = None;
            for (name, handle) in handles {
                if handle.join().is_err() {
                    event!(Level::ERROR, "thread {} panicked", name);
                    panicked.get_or_insert(name);
                }
            }
            (outcome, panicked)
        });
        let elapsed = started.elapsed();

        if let Some(reason) = stop.reason() {
            return Err(RunError::ThreadFailed(reason));
        }
        if let Some(name) = panicked {
            return Err(RunError::Panicked(name));
        }
        match outcome {
            Outcome::Completed => (),
            Outcome::DeadlineExceeded(deadline) => {
                event!(Level::WARN, "gave up after {:?}", deadline);
                return Err(RunError::DeadlineExceeded(deadline));
            }
            Outcome::Stopped | Outcome::ThreadExited => {
                event!(Level::INFO, "machine was stopped before completion");
            }
        }

        let cpus = asic
            .cpus()
            .iter()
            .zip(&monitors)
            .map(|(cpu, monitor)| CpuReport {
                name: cpu.name().to_string(),
                completed: monitor.is_completed(),
                pc: cpu.pc().get(),
            })
            .collect();
        event!(Level::INFO, "run finished after {:?}", elapsed);
        Ok(RunReport { elapsed, cpus })
    }
}

impl Debug for Runner {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("deadline", &self.deadline)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}
