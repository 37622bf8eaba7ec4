use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliError, CliResult, INTERNAL, SUCCESS};

#[derive(Serialize)]
struct VersionOutput {
    name: &'static str,
    version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    build: Option<BuildInfo>,
}

#[derive(Serialize)]
struct BuildInfo {
    target: &'static str,
    target_os: &'static str,
    target_arch: &'static str,
    protocol: ProtocolInfo,
}

#[derive(Serialize)]
struct ProtocolInfo {
    notification_size: usize,
    last_marker: u8,
    default_buffer_size: usize,
}

fn collect(extended: bool) -> VersionOutput {
    VersionOutput {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        build: extended.then(|| BuildInfo {
            target: option_env!("PROCBRIDGE_BUILD_TARGET").unwrap_or("unknown"),
            target_os: std::env::consts::OS,
            target_arch: std::env::consts::ARCH,
            protocol: ProtocolInfo {
                notification_size: procbridge_frame::NOTIFICATION_SIZE,
                last_marker: procbridge_frame::LAST_MARKER,
                default_buffer_size: procbridge_stream::DEFAULT_BUFFER_SIZE,
            },
        }),
    }
}

pub fn run(args: VersionArgs) -> CliResult<i32> {
    let out = collect(args.extended);

    if args.json {
        let json = serde_json::to_string(&out)
            .map_err(|err| CliError::new(INTERNAL, format!("serialize version: {err}")))?;
        println!("{json}");
        return Ok(SUCCESS);
    }

    println!("{} {}", out.name, out.version);
    if let Some(build) = out.build {
        println!("target: {}", build.target);
        println!("target_os: {}", build.target_os);
        println!("target_arch: {}", build.target_arch);
        println!(
            "protocol: notification={}B last_marker={} buffer={}B",
            build.protocol.notification_size,
            build.protocol.last_marker,
            build.protocol.default_buffer_size
        );
    }
    Ok(SUCCESS)
}
