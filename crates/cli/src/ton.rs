//! Table of nodes, redrawn in place while the monitor runs.

use std::io;
use std::time::Duration;

use console::{Term, style};
use tm_monitor::{Health, Network};
use tm_monitor_node::NodeStatus;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::CliMonitor;

const REDRAW_INTERVAL: Duration = Duration::from_secs(1);

/// Redraws the table every second until `shutdown_token` is cancelled.
pub(crate) async fn run(monitor: CliMonitor, shutdown_token: CancellationToken) {
    let term = Term::stdout();
    let mut ticker = tokio::time::interval(REDRAW_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = shutdown_token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let lines = render(&monitor.network(), &monitor.node_statuses());
        if let Err(e) = draw(&term, &lines) {
            warn!(error = %e, "failed to draw table of nodes");
        }
    }
}

fn draw(term: &Term, lines: &[String]) -> io::Result<()> {
    term.clear_screen()?;
    for line in lines {
        term.write_line(line)?;
    }
    term.flush()
}

pub(crate) fn render(network: &Network, nodes: &[NodeStatus]) -> Vec<String> {
    let health = match network.health {
        Health::Full => style(network.health_string()).green(),
        Health::Moderate => style(network.health_string()).yellow(),
        Health::Dead => style(network.health_string()).red(),
    };

    let mut lines = vec![
        format!("Height: {}", style(network.height).bold()),
        format!("Avg block time: {:.3} ms", network.avg_block_latency_ms),
        format!(
            "Validators: {} online / {} total",
            network.num_validators_online, network.num_validators
        ),
        format!(
            "Nodes: {} online / {} total (disconnects: {})",
            network.num_nodes_online, network.num_nodes, network.total_disconnects
        ),
        format!("Health: {health}"),
        String::new(),
        style(format!(
            "{:<32} {:>10} {:>16} {:>7} {:>10}",
            "NAME", "HEIGHT", "BLOCK LATENCY", "ONLINE", "VALIDATOR"
        ))
        .bold()
        .to_string(),
    ];

    lines.extend(nodes.iter().map(row));

    lines
}

fn row(node: &NodeStatus) -> String {
    let online = format!("{:>7}", node.online);
    let online = if node.online {
        style(online).green()
    } else {
        style(online).red()
    };

    format!(
        "{:<32} {:>10} {:>13.3} ms {online} {:>10}",
        node.name, node.height, node.block_latency, node.is_validator
    )
}
