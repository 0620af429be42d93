/*
 * The I/O module for the crossing demo.
 *
 * One task owns every pin on the board. The intention is for this
 * module to be the only part of the program that is device-specific:
 * other tasks drive the outputs through a command channel and receive
 * button presses through the handoff cells below, never touching a
 * peripheral themselves.
 *
 * Button edges follow the flag-only handoff discipline: the edge
 * branch of the select loop stands in for an interrupt handler, so it
 * does bounded work only. It timestamps the edge, queues it, signals
 * the flag, and goes back to sleeping on the pins. A full queue drops
 * the edge and counts the drop; the debounce task reports the tally
 * from its own context.
 */

use core::fmt::Write as _;

use crossing_core::command::MAX_RESPONSE;
use crossing_core::debounce::{DEBOUNCE_WINDOW, DebounceBank};
use crossing_core::handoff::{EventCounter, EventFlag, EventQueue};
use embassy_futures::select::{Either4, select4};
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Level, Output};
use embassy_stm32::mode::Async;
use embassy_stm32::peripherals;
use embassy_stm32::timer::simple_pwm::SimplePwmChannel;
use embassy_stm32::usart::UartTx;
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::{Receiver, Sender};
use embassy_time::Instant;
use enum_ordinalize::Ordinalize;
use heapless::String;

#[derive(Ordinalize, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(usize)]
pub enum Button {
    Pedestrian,
    ClaimA,
    ClaimB,
}

/// Desired state of the three crossing lamps.
#[derive(Copy, Clone)]
pub struct Lamps {
    pub red: bool,
    pub amber: bool,
    pub green: bool,
}

#[derive(Copy, Clone)]
pub enum IoCommand {
    Lamps(Lamps),
    Rgb(bool, bool, bool),
    /// Tone on or off; callers own the timing.
    Beep(bool),
}

pub const CHANNEL_CAPACITY: usize = 4;
pub const CONSOLE_CAPACITY: usize = 8;

/// One line of status text on its way to the serial console.
pub type ConsoleLine = String<MAX_RESPONSE>;

/// Raw edge journal from the pin watcher to the debounce task.
pub static RAW_EDGES: EventQueue<ThreadModeRawMutex, (Button, Instant), 8> = EventQueue::new();
pub static EDGE_PENDING: EventFlag<ThreadModeRawMutex, ()> = EventFlag::new();
pub static DROPPED_EDGES: EventCounter = EventCounter::new();

/// Debounced presses, dispatched by identity. Collapsing a burst of
/// presses into the latest one is fine for all three buttons.
pub static PEDESTRIAN_REQUEST: EventFlag<ThreadModeRawMutex, Instant> = EventFlag::new();
pub static CLAIM_A_REQUEST: EventFlag<ThreadModeRawMutex, Instant> = EventFlag::new();
pub static CLAIM_B_REQUEST: EventFlag<ThreadModeRawMutex, Instant> = EventFlag::new();

// Deal with active-high or active-low here, so that the rest of the
// program can just use easy to understand `true` for on logic.
fn set_level(pin: &mut Output, on: bool) {
    pin.set_level(if on { Level::High } else { Level::Low });
}

fn report_edge(button: Button) {
    if RAW_EDGES.try_push((button, Instant::now())).is_err() {
        DROPPED_EDGES.record();
    }
    EDGE_PENDING.signal(());
}

#[embassy_executor::task]
pub async fn io_task(
    commands: Receiver<'static, ThreadModeRawMutex, IoCommand, CHANNEL_CAPACITY>,
    mut lamps: [Output<'static>; 3],
    mut rgb: [Output<'static>; 3],
    mut buzzer: SimplePwmChannel<'static, peripherals::TIM3>,
    mut pedestrian: ExtiInput<'static>,
    mut claim_a: ExtiInput<'static>,
    mut claim_b: ExtiInput<'static>,
) -> ! {
    buzzer.set_duty_cycle_fully_off();
    buzzer.enable();

    loop {
        match select4(
            commands.receive(),
            pedestrian.wait_for_falling_edge(),
            claim_a.wait_for_falling_edge(),
            claim_b.wait_for_falling_edge(),
        )
        .await
        {
            Either4::First(IoCommand::Lamps(state)) => {
                set_level(&mut lamps[0], state.red);
                set_level(&mut lamps[1], state.amber);
                set_level(&mut lamps[2], state.green);
            }
            Either4::First(IoCommand::Rgb(r, g, b)) => {
                set_level(&mut rgb[0], r);
                set_level(&mut rgb[1], g);
                set_level(&mut rgb[2], b);
            }
            Either4::First(IoCommand::Beep(on)) => {
                // 50 % duty sounds the fixed-frequency tone.
                if on {
                    buzzer.set_duty_cycle_percent(50);
                } else {
                    buzzer.set_duty_cycle_fully_off();
                }
            }
            Either4::Second(_) => report_edge(Button::Pedestrian),
            Either4::Third(_) => report_edge(Button::ClaimA),
            Either4::Fourth(_) => report_edge(Button::ClaimB),
        }
    }
}

/// Turn the raw edge journal into per-button accepted presses.
#[embassy_executor::task]
pub async fn debounce_task(
    console: Sender<'static, ThreadModeRawMutex, ConsoleLine, CONSOLE_CAPACITY>,
) -> ! {
    let mut bank: DebounceBank<{ Button::VARIANT_COUNT }> = DebounceBank::new(DEBOUNCE_WINDOW);

    loop {
        EDGE_PENDING.wait().await;

        while let Some((button, at)) = RAW_EDGES.try_pop() {
            if !bank.accept(button.ordinal(), at) {
                continue;
            }
            match button {
                Button::Pedestrian => PEDESTRIAN_REQUEST.signal(at),
                Button::ClaimA => CLAIM_A_REQUEST.signal(at),
                Button::ClaimB => CLAIM_B_REQUEST.signal(at),
            }
        }

        let dropped = DROPPED_EDGES.take();
        if dropped > 0 {
            let mut msg = ConsoleLine::new();
            let _ = write!(msg, "dropped {dropped} raw edge(s), journal full");
            console.send(msg).await;
        }
    }
}

/// Serialize every line of status text through one owner of the
/// transmit side, so no other context ever writes the port directly.
#[embassy_executor::task]
pub async fn console_task(
    mut port: UartTx<'static, Async>,
    lines: Receiver<'static, ThreadModeRawMutex, ConsoleLine, CONSOLE_CAPACITY>,
) -> ! {
    loop {
        let text = lines.receive().await;
        // Best effort; the console is telemetry, not a contract.
        let _ = port.write(text.as_bytes()).await;
        let _ = port.write(b"\r\n").await;
    }
}
