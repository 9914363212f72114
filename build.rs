// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: set identifier
fn set_id_arg() -> Arg {
    Arg::new("id").required(true).help("Set identifier")
}

fn build_cli() -> Command {
    Command::new("provsys")
        .version(env!("CARGO_PKG_VERSION"))
        .author("provsys contributors")
        .about("Provisioning backend: batch import and per-device credential issuance")
        .subcommand_required(true)
        .arg(
            Arg::new("prefix")
                .long("prefix")
                .global(true)
                .env("PROVSYS_PREFIX")
                .default_value("/PROV")
                .help("Root under which PROV/, IMPORT/ and EXPORT/ live"),
        )
        .arg(
            Arg::new("ignore")
                .long("ignore")
                .global(true)
                .env("PROVSYS_IGNORE")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .help("Extra directory entries to hide from batch and backup listings"),
        )
        .subcommand(Command::new("status").about("Show install state and set counts"))
        .subcommand(Command::new("batches").about("List inbound batches and whether they are imported"))
        .subcommand(
            Command::new("import")
                .about("Import an inbound batch")
                .arg(Arg::new("batch").required(true).help("Batch file name in the inbound directory")),
        )
        .subcommand(
            Command::new("backup")
                .about("Archive the local install into the outbound directory")
                .arg(Arg::new("name").help("Backup file name")),
        )
        .subcommand(Command::new("backups").about("List outbound backups"))
        .subcommand(
            Command::new("reset")
                .about("Remove config, secret, static files and the set table")
                .arg(
                    Arg::new("yes")
                        .long("yes")
                        .action(ArgAction::SetTrue)
                        .help("Confirm the reset"),
                ),
        )
        .subcommand(
            Command::new("set")
                .about("Set inspection and editing")
                .subcommand_required(true)
                .subcommand(
                    Command::new("list")
                        .about("List all sets")
                        .arg(Arg::new("batch").long("batch").help("Only sets of this batch"))
                        .arg(
                            Arg::new("pending")
                                .long("pending")
                                .action(ArgAction::SetTrue)
                                .help("Only sets issued but not confirmed"),
                        ),
                )
                .subcommand(Command::new("show").about("Show one set").arg(set_id_arg()))
                .subcommand(
                    Command::new("comment")
                        .about("Set or clear the comment of a set")
                        .arg(set_id_arg())
                        .arg(Arg::new("text").help("Comment text (clears the comment if omitted)")),
                )
                .subcommand(
                    Command::new("assign")
                        .about("Pin an unassigned set to a device")
                        .arg(set_id_arg())
                        .arg(Arg::new("dev_id").required(true).help("Device identifier")),
                )
                .subcommand(
                    Command::new("unassign")
                        .about("Release a set from its device")
                        .arg(set_id_arg()),
                ),
        )
        .subcommand(
            Command::new("device")
                .about("Act as a device")
                .subcommand_required(true)
                .arg(Arg::new("dev_id").long("dev-id").required(true).help("Device identifier"))
                .arg(Arg::new("prod_id").long("prod-id").required(true).help("Product identifier"))
                .arg(Arg::new("fw_ver").long("fw-ver").required(true).help("Firmware version"))
                .subcommand(
                    Command::new("fetch-config").about("Issue a set and print the project configuration"),
                )
                .subcommand(
                    Command::new("read-file")
                        .about("Print a declared static or dynamic file")
                        .arg(Arg::new("key").required(true).help("File key, e.g. wifi.cert")),
                )
                .subcommand(Command::new("done").about("Confirm receipt of the issued set"))
                .subcommand(Command::new("purge-code").about("Print the device's purge code")),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory - use CARGO_MANIFEST_DIR which is always set by cargo
    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("provsys.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
