//! services/api/src/bin/openapi.rs
//!
//! Prints the OpenAPI description of the document library API.
//!
//! Usage: `openapi [OUTPUT] [--server URL]`. OUTPUT defaults to
//! `openapi.json`; `-` writes to stdout.

use api_lib::{error::ApiError, web::rest::api_doc};

struct Args {
    output: String,
    server: Option<String>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, ApiError> {
    let mut output = None;
    let mut server = None;
    while let Some(arg) = args.next() {
        if arg == "--server" {
            let url = args
                .next()
                .ok_or_else(|| ApiError::Internal("--server needs a URL".to_string()))?;
            server = Some(url);
        } else if output.is_none() {
            output = Some(arg);
        } else {
            return Err(ApiError::Internal(format!("Unexpected argument '{}'", arg)));
        }
    }
    Ok(Args {
        output: output.unwrap_or_else(|| "openapi.json".to_string()),
        server,
    })
}

fn main() -> Result<(), ApiError> {
    let args = parse_args(std::env::args().skip(1))?;
    let doc = api_doc(args.server.as_deref());
    let json = doc
        .to_pretty_json()
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if args.output == "-" {
        println!("{}", json);
    } else {
        std::fs::write(&args.output, json)?;
        eprintln!(
            "OpenAPI description with {} paths written to {}",
            doc.paths.paths.len(),
            args.output
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::parse_args;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn output_defaults_to_openapi_json() {
        let parsed = parse_args(args(&[])).unwrap();
        assert_eq!(parsed.output, "openapi.json");
        assert!(parsed.server.is_none());
    }

    #[test]
    fn reads_output_and_server_in_any_order() {
        let parsed = parse_args(args(&["--server", "http://localhost:8080", "-"])).unwrap();
        assert_eq!(parsed.output, "-");
        assert_eq!(parsed.server.as_deref(), Some("http://localhost:8080"));
    }

    #[test]
    fn rejects_a_dangling_server_flag_and_extra_paths() {
        assert!(parse_args(args(&["--server"])).is_err());
        assert!(parse_args(args(&["a.json", "b.json"])).is_err());
    }
}
