//! Bench simulator: drives a real relay with scripted BMS traffic on an
//! explicit scheduler tick and logs the rendered status surface.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Instant;

use anyhow::bail;
use bms_relay::protocol::{build_frame, FrameType};
use bms_relay::{LockState, Relay, UnknownByteRun, MAX_FRAME_LEN};
use bms_monitor::StatusReport;
use clap::Parser;
use log::{debug, info, warn};

#[derive(Parser)]
struct Cli {
    /// Scheduler ticks to run
    #[arg(long, default_value_t = 40)]
    ticks: u32,
    /// Tick period in milliseconds
    #[arg(long, default_value_t = 25)]
    tick_ms: u64,
    /// Close the forwarding gate for the whole run
    #[arg(long)]
    locked: bool,
    /// Inject this value's bytes in place of live data at startup
    #[arg(long)]
    serial_override: Option<u32>,
}

fn push_frame(out: &mut VecDeque<u8>, frame_type: FrameType, payload: &[u8]) {
    let mut buf = [0u8; MAX_FRAME_LEN];
    let len = build_frame(frame_type, payload, &mut buf).expect("scripted frame");
    out.extend(buf[..len].iter().copied());
}

/// One tick's worth of scripted line traffic
fn scripted_traffic(out: &mut VecDeque<u8>, tick: u32, last_tick: u32) {
    // Pack current, every tick: idle draw with a ripple
    let deciamps = -20 - (tick % 5) as i16;
    push_frame(out, FrameType::Current, &deciamps.to_be_bytes());

    if tick % 2 == 0 {
        let soc = 90u8.saturating_sub((tick / 10) as u8);
        push_frame(out, FrameType::StateOfCharge, &[soc]);
    }

    if tick % 4 == 0 {
        let mut cells = [0u8; 30];
        for (i, pair) in cells.chunks_exact_mut(2).enumerate() {
            let mv = 3590 + (i as u16 % 3) * 7;
            pair.copy_from_slice(&mv.to_be_bytes());
        }
        push_frame(out, FrameType::CellVoltages, &cells);
    }

    if tick % 5 == 0 {
        push_frame(out, FrameType::Temperatures, &[24, 25, 25, 26, 24]);
    }

    if tick % 10 == 0 {
        push_frame(out, FrameType::ChargeCounters, &[0x01, 0x90, 0x00, 0x2A]);
        push_frame(out, FrameType::SerialNumber, &0x00C0_FFEEu32.to_be_bytes());
    }

    if tick == 7 {
        out.extend([0x00, 0x13, 0x37, 0xFE]);
    }

    if tick == 13 {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let len = build_frame(FrameType::StateOfCharge, &[88], &mut buf).expect("scripted frame");
        buf[len - 1] ^= 0xFF;
        out.extend(buf[..len].iter().copied());
    }

    if tick == last_tick {
        push_frame(out, FrameType::PowerOff, &[0x01]);
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    info!(
        "BMS relay bench simulator: {} ticks x {}ms, locked={}",
        cli.ticks, cli.tick_ms, cli.locked
    );

    let line: Rc<RefCell<VecDeque<u8>>> = Rc::new(RefCell::new(VecDeque::new()));
    let forwarded = Rc::new(Cell::new(0u64));
    let lock = LockState::new(cli.locked);
    let start = Instant::now();

    let source = {
        let line = line.clone();
        move || line.borrow_mut().pop_front()
    };
    let sink = {
        let forwarded = forwarded.clone();
        move |_b: u8| forwarded.set(forwarded.get() + 1)
    };
    let clock = move || start.elapsed().as_millis() as u64;

    let mut relay = Relay::new(source, sink, clock, lock.clone());

    let packets_seen = Rc::new(Cell::new(0u64));
    {
        let packets_seen = packets_seen.clone();
        relay.add_received_packet_callback(move |packet| {
            packets_seen.set(packets_seen.get() + 1);
            debug!(
                "packet type {:#04x}, {} bytes",
                packet.packet_type(),
                packet.len()
            );
        });
    }

    let unknown_run = Rc::new(RefCell::new(UnknownByteRun::new()));
    {
        let unknown_run = unknown_run.clone();
        relay.set_unknown_data_callback(move |byte| {
            let mut run = unknown_run.borrow_mut();
            if !run.push(byte) {
                warn!("unknown-data accumulation full, dropping 0x{byte:02X}");
            }
        });
    }

    let graceful_shutdowns = Rc::new(Cell::new(0u32));
    {
        let graceful_shutdowns = graceful_shutdowns.clone();
        relay.set_power_off_callback(move || {
            graceful_shutdowns.set(graceful_shutdowns.get() + 1);
            info!("power-off announced; flushing persisted counters");
        });
    }

    if let Some(value) = cli.serial_override {
        info!("serial override armed: {value:#010X}");
        relay.set_serial_override(value);
    }

    let last_tick = cli.ticks.saturating_sub(1);
    for tick in 0..cli.ticks {
        scripted_traffic(&mut line.borrow_mut(), tick, last_tick);
        relay.poll();

        if tick % 10 == 0 {
            let report = StatusReport::collect(&relay, start.elapsed().as_millis() as u64);
            info!("status: {}", report.to_json()?);
        }

        std::thread::sleep(std::time::Duration::from_millis(cli.tick_ms));
    }

    let report = StatusReport::collect(&relay, start.elapsed().as_millis() as u64);
    info!("final status: {}", report.to_json()?);
    info!(
        "forwarded {} bytes, {} packets, {} unknown bytes buffered, {} graceful shutdowns",
        forwarded.get(),
        packets_seen.get(),
        unknown_run.borrow().len(),
        graceful_shutdowns.get()
    );

    if cli.locked && forwarded.get() > 0 {
        bail!("lock gate leaked {} bytes to the sink", forwarded.get());
    }
    if !relay.power_off_detected() {
        bail!("scripted power-off frame was never classified");
    }

    Ok(())
}
