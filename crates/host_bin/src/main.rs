//! Hexite host binary.
//!
//! Opens one binary document and serves the view protocol over stdin/stdout
//! as length-prefixed frames. Logs go to stderr. The process exits when
//! stdin closes.

use std::path::PathBuf;

use clap::Parser;
use hexite_access::{AccessOptions, OpenContext};
use hexite_config::HostConfig;
use hexite_host::{Document, DocumentSession};
use hexite_rpc::{StreamOptions, connect_stream};
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Host command line arguments.
#[derive(Parser, Debug)]
#[command(name = "hexite-host")]
#[command(about = "Serve a binary file to a hexite view over stdin/stdout")]
struct Args {
	/// File path or resource URI to open
	#[arg(value_name = "PATH-OR-URI")]
	target: String,

	/// Configuration file (TOML)
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Address shown for offset 0, hex (0x...) or decimal
	#[arg(short, long, value_name = "N")]
	base_address: Option<String>,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// RUST_LOG wins over --verbose.
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));
	let subscriber = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.finish();
	tracing::subscriber::set_global_default(subscriber)?;

	let config = HostConfig::load_or_default(args.config.as_deref())?;
	tracing::debug!(?config, "host.config");

	let uri = resolve_uri(&args.target, args.base_address.as_deref())?;
	info!(uri = %uri, "Opening document");

	let options = AccessOptions {
		idle_close: config.broker.idle_close(),
	};
	let document = Document::open(&uri, OpenContext::default(), &options).await?;
	let session = DocumentSession::new(document, config.view.max_read_len);

	let stream = StreamOptions {
		max_frame_len: config.rpc.max_frame_len,
		request_timeout: config.rpc.request_timeout(),
	};
	let (channel, pump) = connect_stream(tokio::io::stdin(), tokio::io::stdout(), session.handler(), stream);
	session.attach_view(channel);

	let served = pump.await;
	session.dispose();
	served??;

	info!("Input closed, exiting");
	Ok(())
}

/// Turns the command line target into a resource URI, applying
/// `--base-address` as the `baseAddress` query parameter.
fn resolve_uri(target: &str, base_address: Option<&str>) -> Result<Url, Box<dyn std::error::Error>> {
	let mut uri = match Url::parse(target) {
		// Single-letter schemes are Windows drive letters, not URIs.
		Ok(url) if url.scheme().len() > 1 => url,
		_ => {
			let path = std::path::absolute(target)?;
			Url::from_file_path(&path).map_err(|()| format!("not a usable file path: {}", path.display()))?
		}
	};

	if let Some(base) = base_address {
		let kept: Vec<(String, String)> = uri
			.query_pairs()
			.filter(|(key, _)| key != "baseAddress")
			.map(|(key, value)| (key.into_owned(), value.into_owned()))
			.collect();
		uri.query_pairs_mut().clear().extend_pairs(kept).append_pair("baseAddress", base);
	}
	Ok(uri)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn plain_paths_become_file_uris() {
		let uri = resolve_uri("/tmp/image.bin", None).expect("absolute path");
		assert_eq!(uri.scheme(), "file");
		assert!(uri.path().ends_with("/tmp/image.bin"));
		assert_eq!(uri.query(), None);
	}

	#[test]
	fn uris_are_kept_as_given() {
		let uri = resolve_uri("untitled:Untitled-1", None).expect("uri");
		assert_eq!(uri.as_str(), "untitled:Untitled-1");
	}

	#[test]
	fn base_address_flag_replaces_query_value() {
		let uri = resolve_uri("file:///tmp/a.bin?mode=ro&baseAddress=16", Some("0x400")).expect("uri");
		assert_eq!(hexite_host::parse_base_address(&uri).ok(), Some(0x400));
		assert!(uri.query_pairs().any(|(key, value)| key == "mode" && value == "ro"));
		assert_eq!(uri.query_pairs().filter(|(key, _)| key == "baseAddress").count(), 1);
	}
}
