use clap::Parser;

use front_client::client::{MarketDataClient, TraderClient};
use front_client::configure::load_config_from;
use front_client::flow::FlowReplay;
use front_client::logger::setup_logger;
use front_client::wire::messages::decode_body;
use front_client::wire::{Frame, FrameKind, PushBody, RequestBody, ResponseBody};

#[derive(Parser, Debug)]
#[command(about = "Front gateway client smoke check")]
struct Args {
    /// Config file path
    #[arg(long, default_value = "config/config.yaml")]
    config: String,

    /// Dump a flow log as JSON lines and exit
    #[arg(long, value_name = "FLOW_FILE")]
    dump_flow: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Some(path) = args.dump_flow {
        return dump_flow(&path);
    }

    let config = load_config_from(&args.config)?;
    setup_logger(&config).map_err(|e| anyhow::anyhow!("logger setup failed: {}", e))?;

    // Flow directories are created with parents if missing
    let trader = TraderClient::create_with(
        &config.flow_dir,
        &config.trader_front,
        config.session_config(),
    )?;
    let md = MarketDataClient::create_with(
        &config.flow_md_dir,
        &config.md_front,
        config.session_config(),
    )?;

    println!("{}", trader.api_version());
    println!("{}", md.api_version());

    Ok(())
}

fn dump_flow(path: &str) -> anyhow::Result<()> {
    let replay = FlowReplay::open(path).map_err(|e| anyhow::anyhow!("{}", e))?;

    for item in replay {
        let record = item.map_err(|e| anyhow::anyhow!("corrupt record: {}", e))?;
        let frame = match Frame::decode(&record.frame) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("seq {}: undecodable frame: {}", record.seq, e);
                continue;
            }
        };

        let body = match frame.kind {
            FrameKind::Request => decode_body::<RequestBody>(&frame.body)
                .ok()
                .and_then(|b| serde_json::to_value(&b).ok()),
            FrameKind::Response => decode_body::<ResponseBody>(&frame.body)
                .ok()
                .and_then(|b| serde_json::to_value(&b).ok()),
            FrameKind::Push => decode_body::<PushBody>(&frame.body)
                .ok()
                .and_then(|b| serde_json::to_value(&b).ok()),
            FrameKind::Heartbeat => None,
        };

        let line = serde_json::json!({
            "seq": record.seq,
            "direction": format!("{:?}", record.direction),
            "kind": format!("{:?}", frame.kind),
            "request_id": frame.request_id,
            "body": body,
        });
        println!("{}", line);
    }

    Ok(())
}
