//! # Shortbus CLI
//!
//! 健身器材 RS-485 总线的命令行工具。
//!
//! ```bash
//! # 旁听总线，把解码出的帧实时打印并维护状态缓存
//! shortbus-cli monitor --port /dev/ttyS0 --gpio 18
//!
//! # 冒充外设应答主控；先用 --set 预置关键状态
//! shortbus-cli spoof --port /dev/ttyS0 --gpio 18 --set 5102=0010
//!
//! # 离线解码一帧（带不带前导冒号/CRLF 都行）
//! shortbus-cli decode ":510300020000AA"
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use shortbus_driver::{Monitor, Spoofer, StateCache, SubscriberQueue};
use shortbus_protocol::{CacheKey, Registry, decode, preset_read_response};
use tracing::info;

/// Shortbus CLI - RS-485 总线监视与冒充工具
#[derive(Parser, Debug)]
#[command(name = "shortbus-cli")]
#[command(about = "Monitor and spoof a fitness-equipment RS-485 bus", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// 串口与方向控制引脚参数
#[derive(Args, Debug)]
struct BusArgs {
    /// 串口设备路径
    #[arg(short, long, default_value = "/dev/ttyS0")]
    port: String,

    /// RS-485 收发方向控制的 GPIO 编号
    #[arg(short, long, default_value_t = 18)]
    gpio: u32,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 旁听总线并维护状态缓存，Ctrl-C 退出时打印缓存快照
    Monitor {
        #[command(flatten)]
        bus: BusArgs,

        /// 不实时打印每一帧，只在退出时给快照
        #[arg(short, long)]
        quiet: bool,
    },

    /// 冒充外设应答主控的请求
    Spoof {
        #[command(flatten)]
        bus: BusArgs,

        /// 预置缓存条目，格式 `<地址><命令码>=<十六进制值>`（如 5102=0010），可重复
        #[arg(short, long = "set", value_name = "KEY=HEX")]
        set: Vec<String>,
    },

    /// 解码一帧十六进制文本并打印各字段
    Decode {
        /// 帧文本，前导 `:` 与结尾 CRLF 可省略
        frame: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("shortbus=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Monitor { bus, quiet } => run_monitor(&bus, quiet),
        Commands::Spoof { bus, set } => run_spoof(&bus, &set),
        Commands::Decode { frame } => run_decode(&frame),
    }
}

/// 注册 Ctrl-C，返回「继续运行」标志
fn running_flag() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .context("failed to install Ctrl-C handler")?;
    Ok(running)
}

#[cfg(target_os = "linux")]
fn run_monitor(bus: &BusArgs, quiet: bool) -> Result<()> {
    let line = shortbus_serial::open_rs485(&bus.port, bus.gpio)
        .with_context(|| format!("failed to open {}", bus.port))?;
    let registry = Arc::new(Registry::new());
    let cache = Arc::new(StateCache::new());
    let queue = SubscriberQueue::new();

    let running = running_flag()?;
    let monitor = Monitor::spawn(line, registry, cache.clone(), Some(queue.clone()));
    info!("monitoring {}; press Ctrl-C to stop", bus.port);

    while running.load(Ordering::SeqCst) {
        match queue.recv_timeout(Duration::from_millis(200)) {
            Ok(frame) if !quiet => println!("{frame}\n"),
            _ => {},
        }
    }

    monitor.stop();
    monitor.join().map_err(anyhow::Error::from)?;
    print_snapshot(&cache);
    Ok(())
}

#[cfg(target_os = "linux")]
fn run_spoof(bus: &BusArgs, presets: &[String]) -> Result<()> {
    let registry = Arc::new(Registry::new());
    let cache = Arc::new(StateCache::new());
    for preset in presets {
        let (key, value) = parse_preset(preset)?;
        let frame = preset_read_response(key.address(), key.command_code(), value, &registry)
            .with_context(|| format!("invalid preset {preset}"))?;
        cache.write(frame);
    }

    let line = shortbus_serial::open_rs485(&bus.port, bus.gpio)
        .with_context(|| format!("failed to open {}", bus.port))?;

    let running = running_flag()?;
    let spoofer = Spoofer::spawn(line, registry, cache.clone(), None);
    info!("spoofing on {}; press Ctrl-C to stop", bus.port);

    while running.load(Ordering::SeqCst)
        && spoofer.state() != shortbus_driver::WorkerState::Stopped
    {
        std::thread::sleep(Duration::from_millis(200));
    }

    spoofer.stop();
    spoofer.join().map_err(anyhow::Error::from)?;
    print_snapshot(&cache);
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn run_monitor(_bus: &BusArgs, _quiet: bool) -> Result<()> {
    anyhow::bail!("monitor requires sysfs GPIO and is only available on Linux");
}

#[cfg(not(target_os = "linux"))]
fn run_spoof(_bus: &BusArgs, _presets: &[String]) -> Result<()> {
    anyhow::bail!("spoof requires sysfs GPIO and is only available on Linux");
}

fn run_decode(input: &str) -> Result<()> {
    let frame = decode(&normalize_frame(input), &Registry::new())?;
    println!("{frame}");
    Ok(())
}

/// 补齐省略的前导冒号与 CRLF
fn normalize_frame(input: &str) -> Vec<u8> {
    let trimmed = input.trim();
    let body = trimmed.strip_prefix(':').unwrap_or(trimmed);
    let body = body.strip_suffix("\r\n").unwrap_or(body);
    format!(":{body}\r\n").into_bytes()
}

/// 解析 `5102=0010` 形式的预置参数
fn parse_preset(preset: &str) -> Result<(CacheKey, u64)> {
    let (key, value) = preset
        .split_once('=')
        .with_context(|| format!("preset `{preset}` must look like KEY=HEX"))?;
    let key = CacheKey::parse(key)?;
    let value = u64::from_str_radix(value, 16)
        .with_context(|| format!("preset value `{value}` is not hex"))?;
    Ok((key, value))
}

#[cfg(target_os = "linux")]
fn print_snapshot(cache: &StateCache) {
    let snapshot = cache.snapshot();
    if snapshot.is_empty() {
        println!("cache is empty");
        return;
    }
    println!("cached state ({} entries):", snapshot.len());
    for (key, frame) in snapshot {
        println!(
            "  {key}  {} / {} = {}",
            frame.address_name, frame.command_name, frame.data
        );
    }
}
