//! Engine selection for the configured execution mode.

use polymarket_core::api::ClobOrderClient;
use polymarket_core::config::{Config, ExecutionMode, PolymarketConfig};
use polymarket_core::signing::{Eip712Domain, OrderSigner};
use polymarket_core::{Error, Result};
use std::sync::Arc;
use tracing::{info, warn};
use trading_engine::{
    ClobVenue, CostModel, ExecutionEngine, GatewayConfig, LiveGateway, PaperEngine, SimulatedVenue,
};

/// Build the engine for `mode`. Live mode needs CLOB credentials.
#[allow(clippy::result_large_err)]
pub fn build_engine(config: &Config, mode: ExecutionMode) -> Result<Arc<dyn ExecutionEngine>> {
    let gateway_config = GatewayConfig::from(&config.execution);

    let engine: Arc<dyn ExecutionEngine> = match mode {
        ExecutionMode::Paper => Arc::new(
            PaperEngine::new(CostModel::default()).with_size_step(config.execution.size_step),
        ),
        ExecutionMode::Mock => Arc::new(LiveGateway::new(
            Arc::new(SimulatedVenue::default()),
            gateway_config,
            ExecutionMode::Mock,
        )),
        ExecutionMode::Live => {
            let client = ClobOrderClient::from_config(&config.polymarket)?;
            let signer = order_signer(&config.polymarket)?;
            if !client.address().eq_ignore_ascii_case(&signer.address().to_string()) {
                warn!(
                    api_address = %client.address(),
                    maker = %signer.address(),
                    "Maker key does not match the API address"
                );
            }
            info!(address = %client.address(), maker = %signer.address(), "CLOB order client ready");
            Arc::new(LiveGateway::new(
                Arc::new(ClobVenue::new(client, signer)),
                gateway_config,
                ExecutionMode::Live,
            ))
        }
    };

    info!(mode = %mode, "Execution engine built");
    Ok(engine)
}

/// Maker key for the exchange the configured markets settle on.
#[allow(clippy::result_large_err)]
fn order_signer(config: &PolymarketConfig) -> Result<OrderSigner> {
    let key = config.private_key.as_deref().ok_or_else(|| Error::Config {
        message: "private_key not configured".to_string(),
    })?;
    let domain = if config.neg_risk {
        Eip712Domain::neg_risk_ctf_exchange()
    } else {
        Eip712Domain::ctf_exchange()
    };
    OrderSigner::from_private_key(key, domain)
}
