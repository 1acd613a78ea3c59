//! Core 1 ownership and the flash lockout protocol
//!
//! Core 1 is launched before any service initialization into a wrapper that
//! participates in the flash-write lockout from its very first instruction
//! loop, then waits on the SIO FIFO for its assignment: either the single
//! [`Core1Task`] discovered among the outputs, or nothing, in which case it
//! idles in a low-power wait. The lockout protocol parks core 1 with
//! interrupts masked while core 0 erases/programs flash, because core 1
//! would otherwise keep executing XIP code from the very flash being
//! reprogrammed.
//!
//! A task that takes ownership of core 1 must poll [`core1_poll_lockout`]
//! from its own loop to keep flash writes safe.

use core::cell::RefCell;

use critical_section::Mutex;
use rp2040_hal::multicore::{Multicore, Stack};
use rp2040_hal::pac;
use rp2040_hal::sio::SioFifo;
use rp2040_hal::Sio;

use crate::interface::Core1Task;

// FIFO words; task pointers are flash addresses (>= 0x1000_0000) so small
// integers cannot collide with them
const LOCKOUT_PARK: u32 = 1;
const LOCKOUT_ACK: u32 = 2;
const LOCKOUT_RESUME: u32 = 3;
/// "No task assigned, idle"
const TASK_NONE: u32 = 0;

static mut CORE1_STACK: Stack<2048> = Stack::new();

/// Core 0's side of the FIFO, installed after the core 1 spawn
static LOCKOUT_FIFO: Mutex<RefCell<Option<SioFifo>>> = Mutex::new(RefCell::new(None));

/// Spawn core 1 into its wrapper; call before any service init
pub fn launch(psm: &mut pac::PSM, ppb: &mut pac::PPB, fifo: &mut SioFifo) {
    let mut mc = Multicore::new(psm, ppb, fifo);
    let cores = mc.cores();
    let core1 = &mut cores[1];
    #[allow(static_mut_refs)]
    let stack = unsafe { &mut CORE1_STACK.mem };
    core1
        .spawn(stack, || {
            // Runs on core 1: it owns its own SIO view
            let pac = unsafe { pac::Peripherals::steal() };
            let sio = Sio::new(pac.SIO);
            core1_main(sio.fifo)
        })
        .ok();
}

/// Adopt the FIFO for lockout and start signaling
pub fn install_fifo(fifo: SioFifo) {
    critical_section::with(|cs| {
        LOCKOUT_FIFO.borrow(cs).replace(Some(fifo));
    });
}

/// Hand core 1 its task (or nothing); ends the pre-start wait
pub fn start(task: Option<Core1Task>) {
    with_fifo(|fifo| {
        fifo.write_blocking(task.map(|t| t as usize as u32).unwrap_or(TASK_NONE))
    });
}

/// Park core 1 with interrupts masked for the duration of `f`
///
/// `None` if core 1 was never launched; flash writes must not proceed then.
pub fn with_core1_parked<R>(f: impl FnOnce() -> R) -> Option<R> {
    with_fifo(|fifo| {
        fifo.write_blocking(LOCKOUT_PARK);
        while fifo.read_blocking() != LOCKOUT_ACK {}
        let result = f();
        fifo.write_blocking(LOCKOUT_RESUME);
        result
    })
}

fn with_fifo<R>(f: impl FnOnce(&mut SioFifo) -> R) -> Option<R> {
    critical_section::with(|cs| LOCKOUT_FIFO.borrow(cs).borrow_mut().as_mut().map(f))
}

fn core1_main(mut fifo: SioFifo) -> ! {
    // Lockout participation is live from here on; the task word arrives once
    // core 0 finished enumerating the interfaces
    let task: Option<Core1Task> = loop {
        match fifo.read_blocking() {
            LOCKOUT_PARK => core1_park(&mut fifo),
            TASK_NONE => break None,
            word if word >= 0x1000_0000 => {
                break Some(unsafe { core::mem::transmute::<usize, Core1Task>(word as usize) })
            }
            _ => {}
        }
    };

    match task {
        Some(task) => task(),
        // read_blocking waits on the FIFO event, keeping the idle core in WFE
        None => loop {
            if fifo.read_blocking() == LOCKOUT_PARK {
                core1_park(&mut fifo);
            }
        },
    }
}

/// Lockout service for code running on core 1
///
/// Timing-critical core 1 tasks call this between their protocol frames.
pub fn core1_poll_lockout(fifo: &mut SioFifo) {
    if fifo.read() == Some(LOCKOUT_PARK) {
        core1_park(fifo);
    }
}

fn core1_park(fifo: &mut SioFifo) {
    cortex_m::interrupt::free(|_| {
        fifo.write_blocking(LOCKOUT_ACK);
        while fifo.read_blocking() != LOCKOUT_RESUME {}
    });
}
