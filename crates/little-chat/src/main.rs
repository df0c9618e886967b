//! The `little-chat` terminal client.

#[macro_use]
extern crate tracing;

use std::env;

use little_chat::core::store::MemoryStore;
use little_chat::core::{
    AccountStore, ChatConfig, ControllerBuilder, PersistentAccountStore,
};
use little_chat::{ChatApp, TerminalRenderer, VoiceOutput};
use little_chat_gemini_model::{GeminiConfigBuilder, GeminiProvider};
use tokio::signal;
use tokio::sync::mpsc;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match ChatConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return;
        }
    };
    let Ok(api_key) = env::var("GOOGLE_API_KEY") else {
        eprintln!("GOOGLE_API_KEY environment variable is not set");
        return;
    };

    let mut gemini_config = GeminiConfigBuilder::with_api_key(api_key);
    if let Ok(model) = env::var("GEMINI_MODEL") {
        gemini_config = gemini_config.with_model(model);
    }
    if let Ok(base_url) = env::var("GEMINI_BASE_URL") {
        gemini_config = gemini_config.with_base_url(base_url);
    }
    let model_provider = GeminiProvider::new(gemini_config.build());

    let backend = match config.open_backend() {
        Ok(backend) => backend,
        Err(err) => {
            eprintln!("{err}");
            return;
        }
    };
    debug!("chat history persistence: {}", config.persistence);

    let mut controller_builder =
        ControllerBuilder::with_model_provider(model_provider)
            .with_config(&config);
    let accounts: Box<dyn AccountStore> = match &backend {
        Some(backend) => {
            controller_builder =
                controller_builder.with_backend(backend.clone());
            Box::new(PersistentAccountStore::new(backend.clone()))
        }
        None => Box::new(PersistentAccountStore::new(MemoryStore::new())),
    };
    let mut controller = controller_builder.build();
    if let Err(err) = controller.restore().await {
        warn!("failed to restore chat history: {err}");
        eprintln!("Could not load your previous chats: {err}");
    }

    let (interrupt_tx, interrupt_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while signal::ctrl_c().await.is_ok() {
            if interrupt_tx.send(()).is_err() {
                break;
            }
        }
    });

    let renderer = TerminalRenderer::new(&config.ai_name, config.theme);
    let mut app = ChatApp::new(controller, renderer)
        .with_voice(VoiceOutput::new(config.voice_output))
        .with_accounts(accounts)
        .with_export_dir(config.data_dir.join("exports"))
        .with_interrupts(interrupt_rx);
    app.run().await;
}
