use std::{io::Write, path::PathBuf, sync::Arc, time::Duration};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use env_logger::Env;
use framewalk::{
    ContainerReader, FfmpegLogLevel, FramewalkError, JsonLinesSink, LineSink, MediaSource,
    Pipeline, ProgressCallback, ProgressInfo, ScanOptions, select_video_stream,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  framewalk scan input.mp4\n  framewalk scan input.mkv --json --flush\n  framewalk streams input.mp4 --json\n  framewalk completions zsh > _framewalk";

#[derive(Debug, Parser)]
#[command(
    name = "framewalk",
    version,
    about = "Report per-frame decode metadata of a media file's video stream",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging on stderr.
    #[arg(long, global = true)]
    verbose: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Decode the first video stream and print one line per frame.
    #[command(
        about = "Decode the video stream and report every frame",
        after_help = "Examples:\n  framewalk scan input.mp4\n  framewalk scan input.mp4 --json --progress"
    )]
    Scan {
        /// Input media path.
        input: PathBuf,
        /// Emit JSON lines instead of text.
        #[arg(long)]
        json: bool,
        /// Flush the decoder at end of file to report frames it still holds.
        #[arg(long)]
        flush: bool,
        /// Have FFmpeg print the container layout before decoding.
        #[arg(long)]
        dump_format: bool,
        /// Show a progress spinner on stderr.
        #[arg(long)]
        progress: bool,
        /// Consecutive transient read failures tolerated before giving up.
        #[arg(long)]
        max_read_retries: Option<u32>,
    },

    /// List the stream table and the stream that would be decoded.
    #[command(about = "Print the stream table", visible_alias = "probe")]
    Streams {
        /// Input media path.
        input: PathBuf,
        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::with_template("{spinner:.green} {elapsed} {msg}")?);
        bar.enable_steady_tick(Duration::from_millis(120));
        Ok(Self { bar })
    }
}

impl ProgressCallback for SpinnerProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if info.finished {
            self.bar.finish_and_clear();
        } else {
            self.bar.set_message(format!(
                "{} frames, {} packets",
                info.frames, info.packets
            ));
        }
    }
}

fn init_logging(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    let default_filter = if global.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_target(false)
        .init();

    if let Some(level) = &global.log_level {
        let parsed: FfmpegLogLevel = level.parse()?;
        framewalk::set_ffmpeg_log_level(parsed);
    } else if !global.verbose {
        framewalk::set_ffmpeg_log_level(FfmpegLogLevel::Error);
    }
    log::debug!(
        "FFmpeg log level: {:?}",
        framewalk::get_ffmpeg_log_level()
    );

    Ok(())
}

fn scan(
    input: PathBuf,
    json: bool,
    options: ScanOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = Pipeline::new(options);
    let stdout = std::io::stdout();
    let out = stdout.lock();

    if json {
        pipeline.run_file(&input, JsonLinesSink::new(out))?;
    } else {
        pipeline.run_file(&input, LineSink::new(out))?;
    }
    Ok(())
}

fn streams(input: PathBuf, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut source = MediaSource::open(&input)?;
    let streams = source.probe_streams()?;
    let metadata = source.metadata();
    let selected = match select_video_stream(&streams) {
        Ok(stream) => Some(stream.index),
        Err(FramewalkError::NoVideoStream) => None,
        Err(error) => return Err(error.into()),
    };

    if json {
        let payload = json!({
            "format": metadata.format,
            "duration_seconds": metadata.duration.as_secs_f64(),
            "selected_video_stream": selected,
            "tags": metadata.tags,
            "streams": streams.iter().map(|stream| json!({
                "index": stream.index,
                "kind": stream.kind.to_string(),
                "codec": stream.codec,
                "width": stream.codec_parameters.width,
                "height": stream.codec_parameters.height,
                "pixel_format": stream.codec_parameters.pixel_format,
                "time_base": [stream.codec_parameters.time_base.0, stream.codec_parameters.time_base.1],
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    let mut out = std::io::stdout().lock();
    writeln!(out, "Format: {}", metadata.format)?;
    writeln!(out, "Duration: {:?}", metadata.duration)?;
    if let Some(tags) = &metadata.tags {
        let mut tags: Vec<_> = tags.iter().collect();
        tags.sort();
        for (key, value) in tags {
            writeln!(out, "  {key}: {value}")?;
        }
    }
    for stream in &streams {
        let marker = if Some(stream.index) == selected { "*" } else { " " };
        let (num, den) = stream.codec_parameters.time_base;
        write!(
            out,
            "{marker} #{} {} [{}] time_base={num}/{den}",
            stream.index, stream.kind, stream.codec,
        )?;
        if stream.codec_parameters.width > 0 {
            write!(
                out,
                " {}x{}",
                stream.codec_parameters.width, stream.codec_parameters.height
            )?;
        }
        if let Some(pixel_format) = &stream.codec_parameters.pixel_format {
            write!(out, " {pixel_format}")?;
        }
        writeln!(out)?;
    }
    if selected.is_none() {
        eprintln!("{} {}", "warning:".yellow().bold(), "no video stream".yellow());
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.global)?;

    match cli.command {
        Commands::Scan {
            input,
            json,
            flush,
            dump_format,
            progress,
            max_read_retries,
        } => {
            let mut options = ScanOptions::new()
                .with_flush_at_end_of_stream(flush)
                .with_dump_format(dump_format);
            if let Some(retries) = max_read_retries {
                options = options.with_max_read_retries(retries);
            }
            if progress {
                options = options
                    .with_progress(Arc::new(SpinnerProgress::new()?))
                    .with_batch_size(25);
            }
            scan(input, json, options)?;
        }
        Commands::Streams { input, json } => streams(input, json)?,
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "framewalk", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
