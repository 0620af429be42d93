#![no_std]
#![no_main]

/*
 * Pedestrian-crossing demo for the DESPI-M02 board.
 *
 * The crossing lamps run the RED/GREEN/YELLOW controller with a
 * pedestrian button that cuts a green phase short. Two more buttons
 * each claim an auxiliary signal head through the advisory token lock,
 * standing in for the two cores of a dual-core part; on real dual-core
 * hardware the same endpoints would sit on the mailbox FIFO. A serial
 * console carries status text out and color/tone commands in.
 */

use core::fmt::Write as _;

use crossing_core::command::{Command, unknown_response};
use crossing_core::handoff::{EventCounter, EventFlag};
use crossing_core::intercore::{AdvisoryLock, Endpoint, FifoPair};
use crossing_core::trafficlight::{Phase, TrafficLight};
use embassy_executor::Spawner;
use embassy_futures::select::{Either, select};
use embassy_stm32::exti::{Channel as _, ExtiInput};
use embassy_stm32::gpio::{Level, Output, OutputType, Pin as _, Pull, Speed};
use embassy_stm32::mode::Async;
use embassy_stm32::time::hz;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_stm32::usart::{Config, Uart, UartRx};
use embassy_stm32::{bind_interrupts, peripherals, usart};
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::{Channel, Sender};
use embassy_time::{Duration, Instant, Timer};
use heapless::Vec;
use panic_halt as _;

mod io;
use io::{
    CHANNEL_CAPACITY, CLAIM_A_REQUEST, CLAIM_B_REQUEST, CONSOLE_CAPACITY, ConsoleLine, IoCommand,
    Lamps, PEDESTRIAN_REQUEST,
};

type IoSender = Sender<'static, ThreadModeRawMutex, IoCommand, CHANNEL_CAPACITY>;
type ConsoleSender = Sender<'static, ThreadModeRawMutex, ConsoleLine, CONSOLE_CAPACITY>;

static IO_COMMANDS: Channel<ThreadModeRawMutex, IoCommand, CHANNEL_CAPACITY> = Channel::new();
static CONSOLE: Channel<ThreadModeRawMutex, ConsoleLine, CONSOLE_CAPACITY> = Channel::new();

/// The claim buttons' shared channel and the tally of honored
/// pedestrian requests.
static CLAIM_PORTS: FifoPair<ThreadModeRawMutex, u32> = FifoPair::new();
static CROSSINGS_SERVED: EventCounter = EventCounter::new();

/// Dispatch/response channel to the echo worker.
static WORKER_PORTS: FifoPair<ThreadModeRawMutex, u32> = FifoPair::new();

fn line(text: &str) -> ConsoleLine {
    let mut msg = ConsoleLine::new();
    let _ = msg.push_str(text);
    msg
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let peripherals = embassy_stm32::init(Default::default());

    bind_interrupts!(struct Irqs {
        USART1 => usart::InterruptHandler<peripherals::USART1>;
    });
    let usart = Uart::new(
        peripherals.USART1,
        peripherals.PA10,
        peripherals.PA9,
        Irqs,
        peripherals.DMA1_CH4,
        peripherals.DMA1_CH5,
        Config::default(), // 115200 baud
    )
    .unwrap();
    let (console_tx, command_rx) = usart.split();

    // Crossing lamps: red, amber, green.
    let lamps = [
        Output::new(peripherals.PB10.degrade(), Level::Low, Speed::Low),
        Output::new(peripherals.PB12.degrade(), Level::Low, Speed::Low),
        Output::new(peripherals.PB14.degrade(), Level::Low, Speed::Low),
    ];
    // Auxiliary RGB head for the claim demo and the color commands.
    let rgb = [
        Output::new(peripherals.PB7.degrade(), Level::Low, Speed::Low),
        Output::new(peripherals.PB8.degrade(), Level::Low, Speed::Low),
        Output::new(peripherals.PB9.degrade(), Level::Low, Speed::Low),
    ];

    let pedestrian = ExtiInput::new(
        peripherals.PE11.degrade(),
        peripherals.EXTI11.degrade(),
        Pull::Up,
    );
    let claim_a = ExtiInput::new(
        peripherals.PE13.degrade(),
        peripherals.EXTI13.degrade(),
        Pull::Up,
    );
    let claim_b = ExtiInput::new(
        peripherals.PE15.degrade(),
        peripherals.EXTI15.degrade(),
        Pull::Up,
    );

    let buzzer = SimplePwm::new(
        peripherals.TIM3,
        Some(PwmPin::new_ch1(peripherals.PA6, OutputType::PushPull)),
        None,
        None,
        None,
        hz(2_500),
        Default::default(),
    );
    let buzzer = buzzer.split().ch1;

    let (port_a, port_b) = CLAIM_PORTS.endpoints();

    spawner.must_spawn(io::io_task(
        IO_COMMANDS.receiver(),
        lamps,
        rgb,
        buzzer,
        pedestrian,
        claim_a,
        claim_b,
    ));
    spawner.must_spawn(io::debounce_task(CONSOLE.sender()));
    spawner.must_spawn(io::console_task(console_tx, CONSOLE.receiver()));
    spawner.must_spawn(trafficlight_task(IO_COMMANDS.sender(), CONSOLE.sender()));
    spawner.must_spawn(claim_task(
        "claim a",
        &CLAIM_A_REQUEST,
        port_a,
        IO_COMMANDS.sender(),
        CONSOLE.sender(),
    ));
    spawner.must_spawn(claim_task(
        "claim b",
        &CLAIM_B_REQUEST,
        port_b,
        IO_COMMANDS.sender(),
        CONSOLE.sender(),
    ));
    spawner.must_spawn(command_task(command_rx, IO_COMMANDS.sender(), CONSOLE.sender()));

    // Exercise the message channel once at boot: dispatch a few words
    // and collect the worker's replies, blocking on each pop.
    let (dispatch, respond) = WORKER_PORTS.endpoints();
    spawner.must_spawn(worker_task(respond));
    for word in 1..=3u32 {
        dispatch.push(word).await;
        let reply = dispatch.pop().await;
        let mut msg = ConsoleLine::new();
        let _ = write!(msg, "fifo echo: sent {word}, got {reply}");
        CONSOLE.sender().send(msg).await;
    }

    CONSOLE.sender().send(line("crossing controller up")).await;
}

/// The other context of the dispatch/response pair: pop a word, answer
/// with its successor.
#[embassy_executor::task]
async fn worker_task(port: Endpoint<'static, ThreadModeRawMutex, u32>) -> ! {
    loop {
        let word = port.pop().await;
        port.push(word + 1).await;
    }
}

#[embassy_executor::task]
async fn trafficlight_task(io: IoSender, console: ConsoleSender) -> ! {
    let mut light = TrafficLight::new(Instant::now());
    let mut shown_phase: Option<Phase> = None;
    let mut shown_countdown = 0;
    let mut beeper_was_on = false;

    loop {
        if shown_phase != Some(light.phase()) {
            shown_phase = Some(light.phase());
            shown_countdown = 0;
            io.send(IoCommand::Lamps(Lamps {
                red: light.red(),
                amber: light.amber(),
                green: light.green(),
            }))
            .await;
            console
                .send(line(match light.phase() {
                    Phase::Red => "signal: red",
                    Phase::Green => "signal: green",
                    Phase::Yellow => "signal: yellow",
                }))
                .await;
        }
        if light.countdown() != shown_countdown && light.countdown() > 0 {
            shown_countdown = light.countdown();
            let mut msg = ConsoleLine::new();
            let _ = write!(msg, "time remaining: {shown_countdown} s");
            console.send(msg).await;
        }
        if light.beeper() != beeper_was_on {
            beeper_was_on = light.beeper();
            io.send(IoCommand::Beep(beeper_was_on)).await;
        }

        let deadline = match light.next_deadline() {
            Some(deadline) => deadline,
            // The transition alarm is always armed; this arm is never
            // taken.
            None => Instant::now() + Duration::from_secs(1),
        };
        match select(Timer::at(deadline), PEDESTRIAN_REQUEST.wait()).await {
            Either::First(()) => light.tick(Instant::now()),
            Either::Second(pressed_at) => {
                if light.pedestrian_request(pressed_at) {
                    CROSSINGS_SERVED.record();
                    let mut msg = ConsoleLine::new();
                    let _ = write!(
                        msg,
                        "crossing request during green ({} served)",
                        CROSSINGS_SERVED.get()
                    );
                    console.send(msg).await;
                } else {
                    console
                        .send(line("button pressed outside green, ignored"))
                        .await;
                }
            }
        }
    }
}

/// Run the auxiliary head through one red/green/yellow pass with the
/// tone on, then leave it red and quiet.
async fn run_crossing_cycle(io: &IoSender) {
    io.send(IoCommand::Beep(true)).await;
    for (r, g, b, dwell) in [
        (true, false, false, Duration::from_secs(1)),
        (false, true, false, Duration::from_secs(3)),
        (true, true, false, Duration::from_millis(1_500)),
    ] {
        io.send(IoCommand::Rgb(r, g, b)).await;
        Timer::after(dwell).await;
    }
    io.send(IoCommand::Beep(false)).await;
    io.send(IoCommand::Rgb(true, false, false)).await;
}

#[embassy_executor::task(pool_size = 2)]
async fn claim_task(
    name: &'static str,
    requests: &'static EventFlag<ThreadModeRawMutex, Instant>,
    port: Endpoint<'static, ThreadModeRawMutex, u32>,
    io: IoSender,
    console: ConsoleSender,
) -> ! {
    let mut lock = AdvisoryLock::new(port);

    loop {
        // Keep the peer's announcements drained while idle; a token
        // left sitting in the one-deep slot would stall the peer.
        match select(requests.wait(), lock.watch_remote()).await {
            Either::First(_pressed_at) => {}
            Either::Second(()) => continue,
        }

        if !lock.claim().await {
            let mut msg = ConsoleLine::new();
            let _ = write!(msg, "{name}: crossing busy, request ignored");
            console.send(msg).await;
            continue;
        }

        let mut msg = ConsoleLine::new();
        let _ = write!(msg, "{name}: crossing claimed");
        console.send(msg).await;

        run_crossing_cycle(&io).await;
        lock.release().await;

        let mut msg = ConsoleLine::new();
        let _ = write!(msg, "{name}: crossing released");
        console.send(msg).await;
    }
}

#[embassy_executor::task]
async fn command_task(mut port: UartRx<'static, Async>, io: IoSender, console: ConsoleSender) -> ! {
    let mut buffer: Vec<u8, 64> = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        if port.read(&mut byte).await.is_err() {
            continue;
        }
        if byte[0] != b'\n' {
            // An overlong line can only come out garbled; drop what we
            // have and let the parse below answer "invalid".
            if buffer.push(byte[0]).is_err() {
                buffer.clear();
            }
            continue;
        }

        match core::str::from_utf8(&buffer).ok().and_then(Command::parse) {
            Some(cmd) => {
                // Acknowledge by echoing the token.
                console.send(line(cmd.name())).await;
                match cmd.rgb() {
                    Some((r, g, b)) => io.send(IoCommand::Rgb(r, g, b)).await,
                    None => {
                        io.send(IoCommand::Beep(true)).await;
                        Timer::after_secs(1).await;
                        io.send(IoCommand::Beep(false)).await;
                    }
                }
            }
            None => console.send(unknown_response()).await,
        }
        buffer.clear();
    }
}
