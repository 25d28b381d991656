use std::io::Write;
use std::time::Duration;

use bivstream_stream::decode_hex;
use serde::Serialize;

use crate::cmd::SendArgs;
use crate::exit::{io_error, link_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_value, OutputFormat};

const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct SendOutput {
    link: String,
    bytes_written: usize,
}

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = parse_command(&args.hex)?;

    let mut link = bivstream_link::open(&args.link).map_err(|err| link_error("open failed", err))?;
    link.set_write_timeout(Some(WRITE_TIMEOUT))
        .map_err(|err| link_error("link setup failed", err))?;
    link.write_all(&bytes)
        .and_then(|()| link.flush())
        .map_err(|err| io_error("write failed", err))?;

    print_value(
        &SendOutput {
            link: args.link.to_string(),
            bytes_written: bytes.len(),
        },
        format,
    );
    Ok(SUCCESS)
}

fn parse_command(hex: &str) -> CliResult<Vec<u8>> {
    let bytes =
        decode_hex(hex).map_err(|err| CliError::new(USAGE, format!("--hex is invalid: {err}")))?;
    if bytes.is_empty() {
        return Err(CliError::new(USAGE, "--hex must contain at least one byte"));
    }
    Ok(bytes)
}
