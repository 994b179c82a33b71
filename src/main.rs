use std::{fs::File, io, path::Path, process::ExitCode};

use clap::{Arg, ArgAction, ArgMatches, Command};
use time::OffsetDateTime;
use tracing::{error, info, span, Level};
use tracing_subscriber::EnvFilter;

use ossfs::{Config, DriverRegistry, Filesystem, ObjectRecord, SignOptions, StorageConfig};

fn path_arg(name: &'static str) -> Arg {
    Arg::new(name).required(true)
}

fn command() -> Command {
    Command::new("ossfs")
        .about("Filesystem-style access to OSS buckets")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .default_value("ossfs.toml"),
        )
        .arg(Arg::new("disk").long("disk").short('d'))
        .subcommand_required(true)
        .subcommand(
            Command::new("ls")
                .arg(Arg::new("DIR").default_value(""))
                .arg(
                    Arg::new("recursive")
                        .long("recursive")
                        .short('r')
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("put")
                .arg(path_arg("PATH"))
                .arg(path_arg("FILE"))
                .arg(Arg::new("mimetype").long("mimetype")),
        )
        .subcommand(Command::new("get").arg(path_arg("PATH")).arg(Arg::new("FILE")))
        .subcommand(Command::new("rm").arg(path_arg("PATH")))
        .subcommand(Command::new("rmdir").arg(path_arg("DIR")))
        .subcommand(Command::new("mkdir").arg(path_arg("DIR")))
        .subcommand(Command::new("mv").arg(path_arg("FROM")).arg(path_arg("TO")))
        .subcommand(Command::new("cp").arg(path_arg("FROM")).arg(path_arg("TO")))
        .subcommand(Command::new("stat").arg(path_arg("PATH")))
        .subcommand(Command::new("exists").arg(path_arg("PATH")))
        .subcommand(Command::new("url").arg(path_arg("PATH")))
        .subcommand(
            Command::new("sign").arg(path_arg("PATH")).arg(
                Arg::new("expires")
                    .long("expires")
                    .value_parser(clap::value_parser!(i64))
                    .default_value("3600"),
            ),
        )
}

fn arg<'a>(matches: &'a ArgMatches, name: &str) -> &'a str {
    matches
        .get_one::<String>(name)
        .map(|s| s.as_str())
        .unwrap_or_default()
}

fn print_record(record: &ObjectRecord) {
    match record {
        ObjectRecord::File(file) => println!("{:>12}  {}", file.size, file.path),
        ObjectRecord::Directory(dir) => println!("{:>12}  {}/", "DIR", dir.path),
    }
}

fn run(fs: &Filesystem, name: &str, matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    match name {
        "ls" => {
            let recursive = matches.get_flag("recursive");
            for record in fs.list_contents(arg(matches, "DIR"), recursive)? {
                print_record(&record);
            }
        }
        "put" => {
            let mut file = File::open(arg(matches, "FILE"))?;
            let mut config = Config::new();
            if let Some(mimetype) = matches.get_one::<String>("mimetype") {
                config = config.mimetype(mimetype);
            }
            let result = fs.write_stream(arg(matches, "PATH"), &mut file, &config)?;
            println!("{} ({} bytes, {})", result.path, result.size, result.mimetype);
        }
        "get" => {
            let mut reader = fs.read_stream(arg(matches, "PATH"))?;
            match matches.get_one::<String>("FILE") {
                Some(target) => {
                    let mut file = File::create(Path::new(target))?;
                    io::copy(&mut reader, &mut file)?;
                }
                None => {
                    io::copy(&mut reader, &mut io::stdout().lock())?;
                }
            }
        }
        "rm" => fs.delete(arg(matches, "PATH"))?,
        "rmdir" => fs.delete_dir(arg(matches, "DIR"))?,
        "mkdir" => {
            let record = fs.create_dir(arg(matches, "DIR"), &Config::new())?;
            println!("{}/", record.path);
        }
        "mv" => fs.rename(arg(matches, "FROM"), arg(matches, "TO"))?,
        "cp" => fs.copy(arg(matches, "FROM"), arg(matches, "TO"))?,
        "stat" => {
            let meta = fs.get_metadata(arg(matches, "PATH"))?;
            let modified = OffsetDateTime::from(meta.timestamp);
            println!("path:      {}", meta.path);
            println!("dirname:   {}", meta.dirname);
            println!("size:      {}", meta.size);
            println!("mimetype:  {}", meta.mimetype.unwrap_or_default());
            println!("modified:  {}", modified);
        }
        "exists" => {
            let exists = fs.try_has(arg(matches, "PATH"))?;
            println!("{}", exists);
        }
        "url" => println!("{}", fs.get_url(arg(matches, "PATH"))?),
        "sign" => {
            let secs = matches.get_one::<i64>("expires").copied().unwrap_or(3600);
            let expiration = OffsetDateTime::now_utc()
                .checked_add(time::Duration::seconds(secs))
                .ok_or_else(|| format!("expiration of {} seconds is out of range", secs))?;
            let url = fs.get_temporary_url(arg(matches, "PATH"), expiration, &SignOptions::new())?;
            println!("{}", url);
        }
        other => return Err(format!("unknown command: {}", other).into()),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let span = span!(Level::INFO, "main", context = "main");
    let _e = span.enter();

    let matches = command().get_matches();
    let config_path = arg(&matches, "config");
    let disk = matches.get_one::<String>("disk").map(|s| s.as_str());
    info!(config = config_path, disk = disk, "args");

    let storage = match StorageConfig::load(Path::new(config_path)) {
        Err(err) => {
            error!(error_message=%err, error_group="load_config");
            return ExitCode::FAILURE;
        }
        Ok(storage) => storage,
    };

    let fs = match DriverRegistry::default().disk(&storage, disk) {
        Err(err) => {
            error!(error_message=%err, error_group="build_disk");
            return ExitCode::FAILURE;
        }
        Ok(fs) => fs,
    };

    let Some((name, sub_matches)) = matches.subcommand() else {
        return ExitCode::FAILURE;
    };

    match run(&fs, name, sub_matches) {
        Err(err) => {
            error!(error_message=%err, error_group=name);
            ExitCode::FAILURE
        }
        Ok(()) => ExitCode::SUCCESS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command() {
        command().debug_assert();

        let cases = vec![
            (vec!["ossfs", "ls", "-r", "docs"], "ls"),
            (vec!["ossfs", "--disk", "assets", "put", "a.txt", "./a.txt"], "put"),
            (vec!["ossfs", "sign", "a.txt", "--expires", "60"], "sign"),
        ];

        for (args, expected) in cases {
            let matches = command().try_get_matches_from(&args).unwrap();
            assert_eq!(matches.subcommand_name(), Some(expected), "failed for case: {:?}", args);
        }
    }

    #[test]
    fn test_run_against_memory_disk() {
        let storage = StorageConfig::from_toml(
            r#"
            default = "scratch"
            [disks.scratch]
            driver = "memory"
            "#,
        )
        .unwrap();
        let fs = DriverRegistry::default().disk(&storage, None).unwrap();
        fs.write("docs/a.txt", b"hi", &Config::new()).unwrap();

        let cases = vec![
            vec!["ossfs", "ls", "-r"],
            vec!["ossfs", "cp", "docs/a.txt", "docs/b.txt"],
            vec!["ossfs", "mv", "docs/b.txt", "docs/c.txt"],
            vec!["ossfs", "stat", "docs/c.txt"],
            vec!["ossfs", "exists", "docs/c.txt"],
            vec!["ossfs", "url", "docs/c.txt"],
            vec!["ossfs", "mkdir", "empty"],
            vec!["ossfs", "rm", "docs/a.txt"],
            vec!["ossfs", "rmdir", "docs"],
        ];

        for args in cases {
            let matches = command().try_get_matches_from(&args).unwrap();
            let (name, sub_matches) = matches.subcommand().unwrap();
            run(&fs, name, sub_matches).unwrap_or_else(|err| panic!("failed for case {:?}: {}", args, err));
        }

        let failing = vec![
            vec!["ossfs", "rmdir", "/"],
            vec!["ossfs", "rmdir", "docs/.."],
            vec!["ossfs", "sign", "empty", "--expires", "9223372036854775807"],
            vec!["ossfs", "sign", "empty", "--expires=-9223372036854775808"],
        ];

        for args in failing {
            let matches = command().try_get_matches_from(&args).unwrap();
            let (name, sub_matches) = matches.subcommand().unwrap();
            assert!(run(&fs, name, sub_matches).is_err(), "failed for case: {:?}", args);
        }

        assert!(!fs.has("docs/c.txt"));
        let listing = fs.list_contents("", false).unwrap();
        assert_eq!(listing.len(), 1);
        assert!(listing[0].is_dir());
        assert_eq!(listing[0].path(), "empty");
    }
}
