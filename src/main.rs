use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Arg, ArgMatches, Command};
use log::{info, warn};
use mediabuf::config::{app_name, version};
use mediabuf::engine::ffmpeg::{FfmpegEngine, FfmpegScalerFactory};
use mediabuf::{
    AudioDecoder, DecoderConfig, FrameConverter, PixelLayout, ScaleMode, VideoDecoder,
    VideoFrame, decode_image,
};

/// Poll interval while the ring is empty
const IDLE_WAIT: Duration = Duration::from_millis(5);

fn parse_fit(value: &str) -> anyhow::Result<(u32, u32)> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .with_context(|| format!("Invalid size '{}', expected WIDTHxHEIGHT", value))?;
    let w: u32 = w.trim().parse().with_context(|| format!("Invalid width in '{}'", value))?;
    let h: u32 = h.trim().parse().with_context(|| format!("Invalid height in '{}'", value))?;
    if w == 0 || h == 0 {
        bail!("Size '{}' must be non-zero", value);
    }
    Ok((w, h))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let matches = Command::new(app_name())
        .version(version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("url")
                .value_name("URL")
                .help("Media file path or file:// URL.")
                .required(true),
        )
        .arg(
            Arg::new("kind")
                .short('k')
                .long("kind")
                .value_name("KIND")
                .help("Stream to decode (audio/video/image).")
                .value_parser(["audio", "video", "image"])
                .ignore_case(true)
                .default_value("video"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("JSON decoder configuration."),
        )
        .arg(
            Arg::new("count")
                .short('n')
                .long("count")
                .value_name("N")
                .help("Stop after N decoded units.")
                .value_parser(clap::value_parser!(usize))
                .default_value("100"),
        )
        .arg(
            Arg::new("fit")
                .long("fit")
                .value_name("WIDTHxHEIGHT")
                .help("Crop and scale video frames to this size (RGBA)."),
        )
        .get_matches();

    let config = match matches.get_one::<String>("config") {
        Some(path) => DecoderConfig::load(path)?,
        None => DecoderConfig::default(),
    };

    // stop decoding cleanly on SIGINT, SIGTERM, or SIGHUP
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("Error setting Ctrl-C handler")?;

    let kind = matches
        .get_one::<String>("kind")
        .map(|k| k.to_lowercase())
        .unwrap_or_default();
    match kind.as_str() {
        "audio" => run_audio(&matches, config, &interrupted),
        "image" => run_image(&matches),
        _ => run_video(&matches, config, &interrupted),
    }
}

fn url(matches: &ArgMatches) -> anyhow::Result<&str> {
    matches
        .get_one::<String>("url")
        .map(String::as_str)
        .context("Missing URL")
}

fn count(matches: &ArgMatches) -> usize {
    matches.get_one::<usize>("count").copied().unwrap_or(100)
}

fn run_image(matches: &ArgMatches) -> anyhow::Result<()> {
    let url = url(matches)?;
    let frame = decode_image(&FfmpegEngine::new(), url)
        .with_context(|| format!("Failed to decode image {}", url))?;
    println!(
        "{}: {}x{} {} ({} bytes)",
        url,
        frame.width,
        frame.height,
        frame.layout,
        frame.byte_len()
    );
    Ok(())
}

fn describe(frame: &VideoFrame) -> String {
    format!(
        "pts {} {}x{} {}",
        frame.pts, frame.width, frame.height, frame.layout
    )
}

fn run_video(
    matches: &ArgMatches,
    config: DecoderConfig,
    interrupted: &AtomicBool,
) -> anyhow::Result<()> {
    let url = url(matches)?;
    let decoder = VideoDecoder::open(&FfmpegEngine::new(), url, config)
        .with_context(|| format!("Failed to open {}", url))?;

    let mut converter = match matches.get_one::<String>("fit") {
        Some(fit) => {
            let (w, h) = parse_fit(fit)?;
            let converter = FrameConverter::aspect_fit(
                decoder.source_geometry(),
                w as f64 / h as f64,
                w,
                w,
                PixelLayout::Rgba,
                &FfmpegScalerFactory,
                ScaleMode::default(),
            )?;
            info!("Converting frames to {}", converter.output_geometry());
            Some(converter)
        }
        None => None,
    };

    decoder.start()?;
    let limit = count(matches);
    let mut received = 0;
    while received < limit && !interrupted.load(Ordering::SeqCst) {
        if !decoder.items_available() {
            if !decoder.decoder_running() && !decoder.items_available() {
                break;
            }
            std::thread::sleep(IDLE_WAIT);
            continue;
        }
        let line = match converter.as_mut() {
            Some(converter) => describe(&decoder.next_frame_converted(converter)?),
            None => describe(&decoder.next_item()?),
        };
        println!("frame {:>5} {}", received, line);
        received += 1;
    }

    decoder.stop();
    if received < limit && !interrupted.load(Ordering::SeqCst) {
        warn!("Stream ended after {} frames", received);
    }
    println!("{}", decoder.health().summary());
    Ok(())
}

fn run_audio(
    matches: &ArgMatches,
    config: DecoderConfig,
    interrupted: &AtomicBool,
) -> anyhow::Result<()> {
    let url = url(matches)?;
    let decoder = AudioDecoder::open(&FfmpegEngine::new(), url, config)
        .with_context(|| format!("Failed to open {}", url))?;
    decoder.start()?;

    let limit = count(matches);
    let mut received = 0;
    while received < limit && !interrupted.load(Ordering::SeqCst) {
        let packets = decoder.next_items(limit - received);
        if packets.is_empty() {
            if !decoder.decoder_running() && !decoder.items_available() {
                break;
            }
            std::thread::sleep(IDLE_WAIT);
            continue;
        }
        for packet in &packets {
            println!(
                "audio {:>5} pts {} {} samples x {} ch @ {} Hz",
                received,
                packet.pts,
                packet.samples_per_channel(),
                packet.channels,
                packet.sample_rate
            );
            received += 1;
        }
    }

    decoder.stop();
    if received < limit && !interrupted.load(Ordering::SeqCst) {
        warn!("Stream ended after {} packets", received);
    }
    println!("{}", decoder.health().summary());
    Ok(())
}
