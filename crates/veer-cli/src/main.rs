//! veer - Command Line Entry Point
//!
//! Loads a page, connects its frames, then performs each further argument
//! as a visit and prints the resulting document.
//!
//! ```text
//! veer [--config FILE] [--text] URL [PATH...]
//! ```

use anyhow::{Context, bail};
use std::rc::Rc;
use tracing_subscriber::EnvFilter;
use veer::net::{AbortSignal, FetchRequest, HttpTransport, Location, Transport};
use veer::{Config, EventName, Session, VisitOptions, VisitOutcome};

struct Args {
    config: Option<String>,
    text: bool,
    url: String,
    visits: Vec<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut config = None;
    let mut text = false;
    let mut positional = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(args.next().context("--config needs a file")?),
            "--text" => text = true,
            "-h" | "--help" => {
                println!("usage: veer [--config FILE] [--text] URL [PATH...]");
                std::process::exit(0);
            }
            flag if flag.starts_with("--") => bail!("unknown option {flag}"),
            _ => positional.push(arg),
        }
    }
    let mut positional = positional.into_iter();
    let url = positional.next().context("missing URL")?;
    Ok(Args { config, text, url, visits: positional.collect() })
}

fn load_config(path: Option<&str>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let json = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    Ok(Config::from_json(&json)?)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    let config = load_config(args.config.as_deref())?;
    let location = Location::parse(&args.url)?;
    let transport = Rc::new(HttpTransport::with_options(&config.user_agent, config.request_timeout)?);

    tracing::info!(%location, "loading initial page");
    let response = smol::block_on(transport.fetch(FetchRequest::get(location.clone()), AbortSignal::new()))?;
    let Some(html) = response.html_body() else {
        bail!("{location} answered {} without HTML", response.status);
    };

    let session = Session::builder(response.location.href(), &html)
        .config(config)
        .transport(transport)
        .build()?;
    session.events().on(EventName::Load, |event| {
        if let Some(timing) = &event.detail.timing {
            tracing::info!(location = ?event.detail.location.as_ref().map(Location::href), ?timing, "loaded");
        }
    });

    session.run(async {
        if let Err(error) = session.connect_frames().await {
            tracing::warn!(%error, "frames did not all load");
        }
        for href in &args.visits {
            match session.visit(href, VisitOptions::default()).await? {
                VisitOutcome::Completed => {}
                outcome => tracing::warn!(href = %href, ?outcome, "visit did not complete"),
            }
            session.settle().await;
        }
        anyhow::Ok(())
    })?;

    if args.text {
        let document = session.document();
        println!("{}", document.tree().text_content(document.body()).trim());
    } else {
        println!("{}", session.html());
    }
    Ok(())
}
