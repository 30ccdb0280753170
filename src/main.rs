use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use cwdrill::display::{DisplayPane, group_text};
use cwdrill::sequence::{Transcript, build_transcript};
use cwdrill::{Frame, MorseSettings, PlaybackController, SettingsPatch, WavRenderer, plan};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const NOTHING_TO_SEND: &str = "Character set is empty, nothing to send";

#[derive(Parser)]
#[command(author, version, about = "Morse code copy practice", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play a practice session and reveal the text as it is sent
    Play {
        #[command(flatten)]
        settings: SettingsArgs,
    },
    /// Render a practice session to a WAV file
    Render {
        #[command(flatten)]
        settings: SettingsArgs,
        /// Path of the WAV file to write
        #[arg(short, long, value_name = "WAV_FILE")]
        output: PathBuf,
        #[arg(long, default_value_t = 12000, value_parser = clap::value_parser!(u32).range(4000..=192000))]
        sample_rate: u32,
    },
    /// Print the tone and reveal schedule of a session
    Plan {
        #[command(flatten)]
        settings: SettingsArgs,
    },
}

#[derive(Args)]
struct SettingsArgs {
    /// Words per minute
    #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..))]
    wpm: u32,
    /// Characters to draw the practice text from
    #[arg(long, default_value = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789")]
    chars: String,
    /// Characters per group, 0 disables grouping
    #[arg(long, default_value_t = 5)]
    group_size: usize,
    /// Gap between characters in dot units
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    char_spaces: u32,
    /// Gap between groups in dot units
    #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u32).range(1..))]
    word_spaces: u32,
    /// Output volume, 0 to 1
    #[arg(long, default_value_t = 0.5, value_parser = parse_volume)]
    volume: f32,
    /// Number of practice characters
    #[arg(short = 'n', long, default_value_t = 100)]
    count: usize,
    /// Sent before the practice text and never shown
    #[arg(long, default_value = "VVV")]
    preamble: String,
    /// Tone frequency in Hz
    #[arg(long, default_value_t = 600.0, value_parser = parse_tone)]
    tone: f32,
    /// Seed for a reproducible practice text
    #[arg(long)]
    seed: Option<u64>,
}

impl SettingsArgs {
    fn to_settings(&self) -> MorseSettings {
        let mut settings = MorseSettings::default();
        settings.apply(
            SettingsPatch {
                wpm: Some(self.wpm),
                character_set: Some(self.chars.clone()),
                group_size: Some(self.group_size),
                char_spaces: Some(self.char_spaces),
                word_spaces: Some(self.word_spaces),
                volume: Some(self.volume),
                num_chars: Some(self.count),
                preamble: Some(self.preamble.clone()),
                tone: Some(self.tone),
            },
            false,
        );
        settings
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Nothing is sent, preamble included, when the character set is empty.
    fn transcript(&self, settings: &MorseSettings) -> Option<Transcript> {
        if settings.character_set.is_empty() {
            return None;
        }
        Some(build_transcript(&mut self.rng(), settings))
    }
}

fn parse_volume(s: &str) -> Result<f32, String> {
    let volume: f32 = s.parse().map_err(|_| format!("`{s}` is not a number"))?;
    if !(0.0..=1.0).contains(&volume) {
        return Err("volume must be between 0 and 1".to_string());
    }
    Ok(volume)
}

fn parse_tone(s: &str) -> Result<f32, String> {
    let tone: f32 = s.parse().map_err(|_| format!("`{s}` is not a number"))?;
    if !tone.is_finite() || tone <= 0.0 {
        return Err("tone must be a positive frequency".to_string());
    }
    Ok(tone)
}

/// A line typed while a session plays.
#[derive(Debug, PartialEq)]
enum Input {
    Stop,
    ToggleHidden,
    Volume(f32),
    Tone(f32),
}

fn parse_input(line: &str) -> Option<Input> {
    let mut words = line.split_whitespace();
    let input = match (words.next()?, words.next()) {
        ("q", None) => Input::Stop,
        ("h", None) => Input::ToggleHidden,
        ("v", Some(value)) => Input::Volume(value.parse().ok()?),
        ("t", Some(value)) => Input::Tone(value.parse().ok()?),
        _ => return None,
    };
    Some(input)
}

#[cfg(feature = "audio-cpal")]
fn default_backend() -> cwdrill::CpalBackend {
    cwdrill::CpalBackend::new()
}

#[cfg(not(feature = "audio-cpal"))]
fn default_backend() -> cwdrill::UnavailableBackend {
    cwdrill::UnavailableBackend::new("built without the audio-cpal feature")
}

fn main() -> Result<()> {
    // Logs go to stderr. Use `RUST_LOG=info` or `RUST_LOG=debug` to see output.
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Play { settings } => play(&settings),
        Command::Render {
            settings,
            output,
            sample_rate,
        } => render(&settings, output, sample_rate),
        Command::Plan { settings } => print_plan(&settings),
    }
}

fn play(args: &SettingsArgs) -> Result<()> {
    let settings = args.to_settings();
    let group_size = settings.group_size;
    let mut controller = match args.seed {
        Some(seed) => PlaybackController::with_seed(default_backend(), settings, seed),
        None => PlaybackController::new(default_backend(), settings),
    };

    controller.start(Instant::now())?;
    if !controller.is_playing() {
        println!("{}", NOTHING_TO_SEND);
        return Ok(());
    }
    println!("Commands: q = stop, h = hide/show text, v <0..1> = volume, t <hz> = tone");

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut pane = DisplayPane::default();
    let mut stdout = io::stdout();
    loop {
        let mut redraw = false;
        while let Ok(line) = rx.try_recv() {
            match parse_input(&line) {
                Some(Input::Stop) => controller.stop(),
                Some(Input::ToggleHidden) => {
                    pane.toggle_hidden();
                    redraw = true;
                }
                Some(Input::Volume(volume)) => {
                    controller.update_settings(SettingsPatch::volume(volume))
                }
                Some(Input::Tone(tone)) => controller.update_settings(SettingsPatch::tone(tone)),
                None => log::warn!("Unknown command: {:?}", line.trim()),
            }
        }

        let frame = controller.tick(Instant::now());
        if redraw || matches!(frame, Frame::Revealed(_) | Frame::Finished) {
            let text = pane.render(
                controller.generated_text(),
                controller.visible_chars_count(),
                group_size,
            );
            write!(stdout, "\x1b[2K\r{}", text)?;
            stdout.flush()?;
        }
        if matches!(frame, Frame::Idle | Frame::Finished) {
            break;
        }
        thread::sleep(FRAME_INTERVAL);
    }

    println!("\n\n--- Sent Text ---");
    println!("{}", group_text(controller.generated_text(), group_size));
    Ok(())
}

fn render(args: &SettingsArgs, output: PathBuf, sample_rate: u32) -> Result<()> {
    let settings = args.to_settings();
    let Some(transcript) = args.transcript(&settings) else {
        println!("{}", NOTHING_TO_SEND);
        return Ok(());
    };
    let schedule = plan(&transcript, &settings, 0.0);

    WavRenderer::new(sample_rate, settings.tone, settings.volume)
        .write_wav_file(&schedule, &output)
        .with_context(|| format!("Failed to write {:?}", output))?;

    println!("Wrote {:?} ({:.1}s)", output, schedule.duration());
    println!("{}", group_text(transcript.body(), settings.group_size));
    Ok(())
}

fn print_plan(args: &SettingsArgs) -> Result<()> {
    let settings = args.to_settings();
    let Some(transcript) = args.transcript(&settings) else {
        println!("{}", NOTHING_TO_SEND);
        return Ok(());
    };
    let schedule = plan(&transcript, &settings, 0.0);

    println!("Preamble: {}", transcript.preamble());
    println!("Text:     {}", group_text(transcript.body(), settings.group_size));
    println!(
        "Dot: {:.0} ms, {} tones, {:.2}s",
        settings.dot_duration() * 1000.0,
        schedule.tones().len(),
        schedule.duration()
    );
    for reveal in schedule.reveals() {
        println!("{:>9.3}s  {}", reveal.time, reveal.character);
    }
    Ok(())
}
