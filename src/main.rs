#[macro_use]
extern crate tracing;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::env;
use std::path::PathBuf;
use virsh_remote::definition::{change_bandwidth, change_boot, change_mac, create_definition};
use virsh_remote::domain_xml::{MacReplaceMode, NetworkDescriptor, VmDescriptor};
use virsh_remote::lifecycle;
use virsh_remote::structs::HostSettings;
use virsh_remote::transfer::{download_file, fetch_definition, upload_file};
use virsh_remote::{Session, SETTINGS};

#[derive(Parser, Debug)]
#[command(name = "virsh_remote", version, about = "Manage libvirt guests over ssh")]
struct Cli {
    /// Overrides the `host` setting
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// Overrides the `remote_base_path` setting
    #[arg(long)]
    base_path: Option<String>,
    #[arg(long, short)]
    username: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LinkState {
    Up,
    Down,
}

#[derive(Subcommand, Debug)]
enum Command {
    List,
    Start { name: String },
    Destroy { name: String },
    Shutdown { name: String },
    Reboot { name: String },
    Suspend { name: String },
    Resume { name: String },
    Save { name: String, file: String },
    Restore { file: String },
    Define { file: String },
    Undefine { name: String },
    DumpXml { name: String },
    Info { name: String },
    Iflist { name: String },
    CreateDisk {
        name: String,
        size: String,
        #[arg(long, default_value = "qcow2")]
        format: String,
    },
    Clone {
        source: String,
        dest: String,
        #[arg(long)]
        disk: Option<String>,
    },
    AttachDisk { name: String, image: String, target: String },
    DetachDisk { name: String, target: String },
    AttachIso { name: String, iso: String },
    DetachIso { name: String },
    SetLink {
        name: String,
        iface: String,
        #[arg(value_enum)]
        state: LinkState,
    },
    SetPermission { name: String },
    /// Generates a definition and uploads it to `<base>/<name>.xml`
    CreateXml {
        name: String,
        vcpus: u32,
        memory_kib: u64,
        #[arg(long)]
        disk: Option<String>,
        #[arg(long)]
        iso: Option<String>,
        #[arg(long, default_value = "hd")]
        boot: String,
        #[arg(long, default_value = "network")]
        network_type: String,
        #[arg(long, default_value = "default")]
        network: String,
        #[arg(long)]
        mac: Option<String>,
        #[arg(long)]
        bridge: Option<String>,
        #[arg(long, default_value_t = 0)]
        bandwidth_in: u64,
        #[arg(long, default_value_t = 0)]
        bandwidth_out: u64,
        #[arg(long, default_value_t = 5900)]
        vnc_port: u16,
    },
    SetBoot {
        name: String,
        #[arg(default_value = "hd")]
        device: String,
    },
    SetBandwidth { name: String, inbound: u64, outbound: u64 },
    ChangeMac {
        name: String,
        #[arg(long, default_value = "")]
        mac: String,
        /// Only rewrite `<mac>` elements of interfaces
        #[arg(long)]
        structural: bool,
    },
    Upload { local: PathBuf, remote: String },
    Download { remote: String, local: PathBuf },
    FetchXml { name: String, local: PathBuf },
}

fn print_patch(vm: &str, result: Option<String>) {
    match result {
        Some(_) => println!("updated definition of {vm}"),
        None => println!("definition of {vm} could not be read, nothing changed"),
    }
}

fn execute(session: &mut Session, command: Command) -> Result<()> {
    let output = match command {
        Command::List => {
            for name in lifecycle::list(session)? {
                println!("{name}");
            }
            return Ok(());
        }
        Command::Info { name } => {
            let mut info: Vec<_> = lifecycle::get_info(session, &name)?.into_iter().collect();
            info.sort();
            for (key, value) in info {
                println!("{key}: {value}");
            }
            return Ok(());
        }
        Command::Iflist { name } => {
            for iface in lifecycle::get_network(session, &name)? {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    iface.interface,
                    iface.kind.unwrap_or_default(),
                    iface.source.unwrap_or_default(),
                    iface.model.unwrap_or_default(),
                    iface.mac.unwrap_or_default()
                );
            }
            return Ok(());
        }
        Command::CreateXml {
            name,
            vcpus,
            memory_kib,
            disk,
            iso,
            boot,
            network_type,
            network,
            mac,
            bridge,
            bandwidth_in,
            bandwidth_out,
            vnc_port,
        } => {
            let desc = VmDescriptor {
                disk_path: disk,
                iso_path: iso,
                boot_device: boot,
                network: NetworkDescriptor {
                    kind: network_type,
                    name: network,
                    mac,
                    bridge,
                    bandwidth_in_kibps: bandwidth_in,
                    bandwidth_out_kibps: bandwidth_out,
                },
                vnc_port,
                ..VmDescriptor::new(&name, vcpus, memory_kib)
            };
            create_definition(session, &desc)?
        }
        Command::SetBoot { name, device } => {
            print_patch(&name, change_boot(session, &name, &device)?);
            return Ok(());
        }
        Command::SetBandwidth { name, inbound, outbound } => {
            print_patch(&name, change_bandwidth(session, &name, inbound, outbound)?);
            return Ok(());
        }
        Command::ChangeMac { name, mac, structural } => {
            let mode = if structural {
                MacReplaceMode::Structural
            } else {
                MacReplaceMode::Textual
            };
            print_patch(&name, change_mac(session, &name, &mac, mode)?);
            return Ok(());
        }
        Command::Upload { local, remote } => {
            upload_file(session, &local, &remote)?;
            return Ok(());
        }
        Command::Download { remote, local } => {
            download_file(session, &remote, &local)?;
            return Ok(());
        }
        Command::FetchXml { name, local } => {
            fetch_definition(session, &name, &local)?;
            return Ok(());
        }
        Command::Start { name } => lifecycle::start(session, &name)?,
        Command::Destroy { name } => lifecycle::destroy(session, &name)?,
        Command::Shutdown { name } => lifecycle::shutdown(session, &name)?,
        Command::Reboot { name } => lifecycle::reboot(session, &name)?,
        Command::Suspend { name } => lifecycle::suspend(session, &name)?,
        Command::Resume { name } => lifecycle::resume(session, &name)?,
        Command::Save { name, file } => lifecycle::save(session, &name, &file)?,
        Command::Restore { file } => lifecycle::restore(session, &file)?,
        Command::Define { file } => lifecycle::define(session, &file)?,
        Command::Undefine { name } => lifecycle::undefine(session, &name)?,
        Command::DumpXml { name } => lifecycle::dump_xml(session, &name)?,
        Command::CreateDisk { name, size, format } => {
            lifecycle::create_disk(session, &name, &format, &size)?
        }
        Command::Clone { source, dest, disk } => {
            lifecycle::clone_vm(session, &source, &dest, disk.as_deref())?
        }
        Command::AttachDisk { name, image, target } => {
            lifecycle::attach_disk(session, &name, &image, &target)?
        }
        Command::DetachDisk { name, target } => lifecycle::detach_disk(session, &name, &target)?,
        Command::AttachIso { name, iso } => lifecycle::attach_iso(session, &name, &iso)?,
        Command::DetachIso { name } => lifecycle::detach_iso(session, &name)?,
        Command::SetLink { name, iface, state } => {
            lifecycle::set_network(session, &name, &iface, matches!(state, LinkState::Up))?
        }
        Command::SetPermission { name } => lifecycle::set_permission(session, &name)?,
    };
    print!("{output}");
    Ok(())
}

fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    let cli = Cli::parse();

    let mut settings = {
        let cfg = SETTINGS
            .read()
            .map_err(|e| anyhow!("settings lock poisoned: {e}"))?;
        HostSettings::from_config(&cfg).context("invalid settings")?
    };
    env::set_var("RUST_LOG", &settings.log_level);
    tracing_subscriber::fmt::init();

    info!(
        "virsh_remote {} {}",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    if let Some(host) = cli.host {
        settings.host = host;
    }
    if let Some(port) = cli.port {
        settings.port = port;
    }
    if let Some(base_path) = cli.base_path {
        settings.remote_base_path = base_path;
    }
    if let Some(username) = cli.username {
        settings.username = username;
    }

    let mut session = Session::from_settings(&settings);
    session
        .connect(&settings.username, &settings.password)
        .with_context(|| format!("couldn't connect to {}:{}", settings.host, settings.port))?;
    let result = execute(&mut session, cli.command);
    session.disconnect();
    result
}
