//! One-shot agent run from the terminal.

use serde_json::json;
use webpilot_core::Config;

use super::agent::{execute_run, RunParams};

pub async fn run_task(
    config: Config,
    task: String,
    session_id: Option<String>,
    cdp_ws_url: Option<String>,
    provider: Option<String>,
    json_output: bool,
) -> anyhow::Result<()> {
    let params = RunParams {
        task,
        session_id,
        cdp_ws_url,
        provider,
    };

    match execute_run(&config, params).await {
        Ok(output) => {
            if json_output {
                let body = json!({
                    "success": true,
                    "response": output.result.response,
                    "executedCodes": output.result.executed_codes,
                    "stepCount": output.result.step_count,
                    "stopReason": output.result.stop_reason,
                    "sandboxProvider": output.sandbox_provider.as_str(),
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                println!("{}", output.result.response);
                eprintln!(
                    "({} steps, {} via {}, backend {})",
                    output.result.step_count,
                    output.llm_model,
                    output.llm_provider,
                    output.sandbox_provider.as_str()
                );
            }
            Ok(())
        }
        Err(failure) => {
            if json_output {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "success": false,
                        "error": failure.message(),
                    }))?
                );
            }
            Err(anyhow::anyhow!("{}", failure.message()))
        }
    }
}
