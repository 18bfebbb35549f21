//! Binary entry point: wires `synth-core::Engine` to a `cpal` output
//! stream, an optional `midir` input port, and a background thread that
//! ticks the arpeggiator/melody schedulers.
//!
//! `Engine` itself has no internal locking (see its own docs), so every
//! thread that touches it here shares one `Arc<parking_lot::Mutex<Engine>>`:
//! the audio callback, the MIDI callback, and the scheduler thread.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use midir::{MidiInput, MidiInputConnection};
use parking_lot::Mutex;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use synth_core::{Engine, Preset};

/// How often the background thread advances the arpeggiator and melody
/// player. Coarser than the audio callback's own per-frame clock, which
/// only matters for picking note-on/off boundaries, not audio quality.
const SCHEDULER_TICK: Duration = Duration::from_millis(5);

struct Args {
    midi_port_index: Option<usize>,
    preset_path: Option<String>,
}

fn parse_args() -> Args {
    let mut midi_port_index = None;
    let mut preset_path = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--midi-port" => {
                midi_port_index = args.next().and_then(|v| v.parse().ok());
            }
            "--preset" => {
                preset_path = args.next();
            }
            other => {
                log::warn!("ignoring unrecognized argument: {other}");
            }
        }
    }
    Args { midi_port_index, preset_path }
}

fn load_preset(engine: &Mutex<Engine>, path: &str) {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let preset = Preset::parse(&text);
            engine.lock().apply_preset(&preset);
            log::info!("loaded preset from {path}");
        }
        Err(err) => {
            log::warn!("could not read preset {path}: {err}; starting from defaults");
        }
    }
}

/// Open a MIDI input port and forward every message straight into the
/// engine. A missing port, or any connection failure, is logged and the
/// synth keeps running without MIDI input rather than aborting startup.
fn connect_midi(
    engine: Arc<Mutex<Engine>>,
    port_index: Option<usize>,
) -> Option<MidiInputConnection<()>> {
    let midi_in = match MidiInput::new("synth-app-input") {
        Ok(m) => m,
        Err(err) => {
            log::warn!("could not initialize MIDI input: {err}; continuing without MIDI");
            return None;
        }
    };

    let ports = midi_in.ports();
    if ports.is_empty() {
        log::warn!("no MIDI input ports available; continuing without MIDI");
        return None;
    }
    let index = port_index.unwrap_or(0);
    let Some(port) = ports.get(index) else {
        log::warn!("MIDI port index {index} out of range ({} available); continuing without MIDI", ports.len());
        return None;
    };
    let port_name = midi_in.port_name(port).unwrap_or_else(|_| format!("port {index}"));

    let connection = midi_in.connect(
        port,
        "synth-app-midi-in",
        move |_timestamp_us, message, _| {
            log::debug!("midi in: {message:02x?}");
            engine.lock().handle_midi(message);
        },
        (),
    );

    match connection {
        Ok(conn) => {
            log::info!("connected to MIDI input: {port_name}");
            Some(conn)
        }
        Err(err) => {
            log::warn!("failed to connect to MIDI input {port_name}: {err}; continuing without MIDI");
            None
        }
    }
}

fn build_output_stream(
    engine: Arc<Mutex<Engine>>,
) -> Result<cpal::Stream, Box<dyn Error>> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or("no default audio output device")?;
    let config = device.default_output_config()?;
    let channels = config.channels() as usize;
    let sample_format = config.sample_format();
    let stream_config: cpal::StreamConfig = config.into();

    let err_fn = |err| log::error!("audio stream error: {err}");

    // The engine's render loop is fixed at stereo; for mono output we
    // still render a stereo frame and fold it down.
    let stream = match sample_format {
        cpal::SampleFormat::I16 => device.build_output_stream(
            &stream_config,
            move |data: &mut [i16], _| fill_i16(data, channels, &engine),
            err_fn,
            None,
        )?,
        cpal::SampleFormat::F32 => device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _| fill_f32(data, channels, &engine),
            err_fn,
            None,
        )?,
        other => return Err(format!("unsupported sample format: {other:?}").into()),
    };
    Ok(stream)
}

fn fill_i16(data: &mut [i16], channels: usize, engine: &Mutex<Engine>) {
    if channels == 2 {
        engine.lock().render_buffer(data);
        return;
    }
    let mut stereo = vec![0i16; (data.len() / channels.max(1)) * 2];
    engine.lock().render_buffer(&mut stereo);
    for (frame, out) in stereo.chunks_exact(2).zip(data.chunks_mut(channels.max(1))) {
        let mono = ((frame[0] as i32 + frame[1] as i32) / 2) as i16;
        for sample in out {
            *sample = mono;
        }
    }
}

fn fill_f32(data: &mut [f32], channels: usize, engine: &Mutex<Engine>) {
    let frame_count = data.len() / channels.max(1);
    let mut pcm = vec![0i16; frame_count * 2];
    engine.lock().render_buffer(&mut pcm);
    for (frame, out) in pcm.chunks_exact(2).zip(data.chunks_mut(channels.max(1))) {
        let l = frame[0] as f32 / 32768.0;
        let r = frame[1] as f32 / 32768.0;
        if channels >= 2 {
            out[0] = l;
            out[1] = r;
            for sample in out.iter_mut().skip(2) {
                *sample = 0.0;
            }
        } else if let Some(sample) = out.first_mut() {
            *sample = 0.5 * (l + r);
        }
    }
}

/// Drain every voice with a note-off before the stream is torn down, so
/// playback ends on silence rather than a hard cut mid-release.
fn drain_voices(engine: &Mutex<Engine>) {
    const ALL_NOTES_OFF: [u8; 3] = [0xB0, 123, 0];
    engine.lock().handle_midi(&ALL_NOTES_OFF);
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = parse_args();

    let engine = Arc::new(Mutex::new(Engine::new()));
    if let Some(path) = &args.preset_path {
        load_preset(&engine, path);
    }

    let _midi_connection = connect_midi(Arc::clone(&engine), args.midi_port_index);

    let stop = Arc::new(AtomicBool::new(false));
    let scheduler_handle = {
        let engine = Arc::clone(&engine);
        let stop = Arc::clone(&stop);
        let dt = SCHEDULER_TICK.as_secs_f32();
        thread::Builder::new()
            .name("synth-scheduler".into())
            .spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    engine.lock().tick_schedulers(dt);
                    thread::sleep(SCHEDULER_TICK);
                }
            })?
    };

    let stream = build_output_stream(Arc::clone(&engine))?;
    stream.play()?;
    log::info!("synth-app running; press enter to stop");

    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);

    drop(stream);
    drain_voices(&engine);
    stop.store(true, Ordering::Relaxed);
    let _ = scheduler_handle.join();

    Ok(())
}
