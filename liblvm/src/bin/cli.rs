// SPDX-License-Identifier: GPL-3.0-only

//! CLI wrapper around the liblvm library for manual operations

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use liblvm::lvm_types::{bytes_to_pretty, parse_size};
use liblvm::retry::{DEFAULT_RETRY_DELAY, deactivate_with_retry};
use liblvm::{LogicalVolume, Lvm, LvmConfig, NativeBackend, OpenMode, VolumeGroup};

type NativeLvm = Lvm<NativeBackend>;

/// Inspect and modify LVM volume groups through liblvm2app
#[derive(Parser)]
#[command(name = "liblvm-cli")]
#[command(about = "CLI tool for LVM operations", long_about = None)]
struct Cli {
    /// TOML file with library settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory containing lvm.conf
    #[arg(long, global = true)]
    system_dir: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the library version
    Version,
    /// List volume group names
    ListVgs {
        /// List UUIDs instead of names
        #[arg(long)]
        uuids: bool,
    },
    /// Show volume group details
    VgInfo {
        /// Volume group name
        vg: String,
        /// Open mode, "r" or "w" ("w" holds the write lock while reading)
        #[arg(long, default_value = "r")]
        mode: OpenMode,
    },
    /// List logical volumes in a volume group
    ListLvs {
        /// Volume group name
        vg: String,
        /// Open mode, "r" or "w"
        #[arg(long, default_value = "r")]
        mode: OpenMode,
        /// One line per volume instead of JSON
        #[arg(long)]
        pretty: bool,
    },
    /// List physical volumes in a volume group
    ListPvs {
        /// Volume group name
        vg: String,
        /// Open mode, "r" or "w"
        #[arg(long, default_value = "r")]
        mode: OpenMode,
        /// One line per volume instead of JSON
        #[arg(long)]
        pretty: bool,
    },
    /// Create a linear logical volume
    CreateLv {
        /// Volume group name
        vg: String,
        /// Name of the logical volume to create
        name: String,
        /// Size, e.g. "100M" or "4096" (bytes)
        size: String,
    },
    /// Show logical volume details
    LvInfo {
        /// Volume group name
        vg: String,
        /// Logical volume name
        lv: String,
    },
    /// Add a tag to a logical volume
    AddTag {
        vg: String,
        lv: String,
        tag: String,
    },
    /// Remove a tag from a logical volume
    RemoveTag {
        vg: String,
        lv: String,
        tag: String,
    },
    /// Activate a logical volume
    Activate { vg: String, lv: String },
    /// Deactivate a logical volume
    Deactivate {
        vg: String,
        lv: String,
        /// Extra attempts while the volume is busy
        #[arg(long, default_value_t = 1)]
        retries: u32,
    },
    /// Remove a logical volume
    RemoveLv { vg: String, lv: String },
    /// Create, tag, deactivate and remove a scratch logical volume
    Demo {
        /// Volume group to work in
        #[arg(default_value = "myvg")]
        vg: String,
        /// Name of the scratch logical volume
        #[arg(long, default_value = "lv_foobar")]
        name: String,
        /// Size of the scratch logical volume
        #[arg(long, default_value = "100000")]
        size: String,
        /// Tag to attach
        #[arg(long, default_value = "my_fance_tag")]
        tag: String,
    },
}

fn load_config(cli: &Cli) -> Result<LvmConfig> {
    let mut config = match &cli.config {
        Some(path) => LvmConfig::load(path)?,
        None => LvmConfig::from_env(),
    };
    if let Some(dir) = &cli.system_dir {
        config.system_dir = Some(dir.clone());
    }
    Ok(config)
}

fn open_lv(
    lvm: &NativeLvm,
    vg: &str,
    lv: &str,
) -> Result<(VolumeGroup<NativeBackend>, LogicalVolume<NativeBackend>)> {
    let vg = lvm.vg_open(vg, OpenMode::Write)?;
    let lv = vg.lv_from_name(lv)?;
    Ok((vg, lv))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn run_demo(lvm: &NativeLvm, vg_name: &str, name: &str, size: u64, tag: &str) -> Result<()> {
    let vg = lvm.vg_open(vg_name, OpenMode::Write)?;

    let lv = vg
        .create_lv_linear(name, size)
        .with_context(|| format!("creating {vg_name}/{name}"))?;
    println!("created: {}", lv.info()?.display_name());
    println!("uuid: {}", lv.uuid()?);
    println!("size: {}", bytes_to_pretty(&lv.size()?, true));

    lv.add_tag(tag)?;
    let tags: Vec<String> = lv.tags()?.into_iter().collect();
    println!("tags: {}", tags.join(", "));

    deactivate_with_retry(&lv, 1, DEFAULT_RETRY_DELAY)?;
    lv.remove()?;

    vg.close()?;
    lvm.close()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    let config = load_config(&cli)?;
    let lvm = Lvm::open(&config)?;

    match cli.command {
        Commands::Version => {
            println!("{{\"version\": {}}}", serde_json::to_string(&lvm.library_version()?)?);
        }
        Commands::ListVgs { uuids } => {
            let list = if uuids {
                lvm.list_vg_uuids()?
            } else {
                lvm.list_vg_names()?
            };
            print_json(&list)?;
        }
        Commands::VgInfo { vg, mode } => {
            let vg = lvm.vg_open(&vg, mode)?;
            print_json(&vg.info()?)?;
        }
        Commands::ListLvs { vg, mode, pretty } => {
            let vg = lvm.vg_open(&vg, mode)?;
            let infos = vg
                .list_lvs()?
                .iter()
                .map(LogicalVolume::info)
                .collect::<liblvm::Result<Vec<_>>>()?;
            if pretty {
                for info in &infos {
                    println!(
                        "{}\t{}\t{}\t{}",
                        info.display_name(),
                        info.device_path(),
                        bytes_to_pretty(&info.size, false),
                        info.state
                    );
                }
            } else {
                print_json(&infos)?;
            }
        }
        Commands::ListPvs { vg, mode, pretty } => {
            let vg = lvm.vg_open(&vg, mode)?;
            let infos = vg
                .list_pvs()?
                .iter()
                .map(|pv| pv.info())
                .collect::<liblvm::Result<Vec<_>>>()?;
            if pretty {
                for info in &infos {
                    println!(
                        "{}\t{} / {}",
                        info.device,
                        bytes_to_pretty(&info.used(), false),
                        bytes_to_pretty(&info.size, false)
                    );
                }
            } else {
                print_json(&infos)?;
            }
        }
        Commands::CreateLv { vg, name, size } => {
            let size = parse_size(&size)?;
            let vg = lvm.vg_open(&vg, OpenMode::Write)?;
            let lv = vg.create_lv_linear(&name, size)?;
            print_json(&lv.info()?)?;
        }
        Commands::LvInfo { vg, lv } => {
            let vg = lvm.vg_open(&vg, OpenMode::Read)?;
            let lv = vg.lv_from_name(&lv)?;
            print_json(&lv.info()?)?;
        }
        Commands::AddTag { vg, lv, tag } => {
            let (_vg, lv) = open_lv(&lvm, &vg, &lv)?;
            lv.add_tag(&tag)?;
            println!("{{\"success\": true}}");
        }
        Commands::RemoveTag { vg, lv, tag } => {
            let (_vg, lv) = open_lv(&lvm, &vg, &lv)?;
            lv.remove_tag(&tag)?;
            println!("{{\"success\": true}}");
        }
        Commands::Activate { vg, lv } => {
            let (_vg, lv) = open_lv(&lvm, &vg, &lv)?;
            lv.activate()?;
            println!("{{\"success\": true}}");
        }
        Commands::Deactivate { vg, lv, retries } => {
            let (_vg, lv) = open_lv(&lvm, &vg, &lv)?;
            deactivate_with_retry(&lv, retries, DEFAULT_RETRY_DELAY)?;
            println!("{{\"success\": true}}");
        }
        Commands::RemoveLv { vg, lv } => {
            let (_vg, lv) = open_lv(&lvm, &vg, &lv)?;
            lv.remove()?;
            println!("{{\"success\": true}}");
        }
        Commands::Demo {
            vg,
            name,
            size,
            tag,
        } => {
            let size = parse_size(&size)?;
            run_demo(&lvm, &vg, &name, size, &tag)?;
        }
    }

    Ok(())
}
