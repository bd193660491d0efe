//! The end-to-end run: decompose the message, submit each document,
//! collect results, compose the reply.
//!
//! Fully sequential. Each network call blocks the pipeline in turn; any
//! failure propagates out and terminates the run, leaving the bounce to
//! the invoking mail system.

use lettre::Message;
use tracing::info;

use crate::api::DocumentApi;
use crate::config::GatewayConfig;
use crate::error::Result;
use crate::mail::{self, Attachment};
use crate::report::{self, DocumentReport};

/// The gateway: config plus the API client built from it.
pub struct Gateway {
    config: GatewayConfig,
    api: DocumentApi,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        let api = DocumentApi::new(
            config.api_url.clone(),
            config.secret_key.clone(),
            config.poll_interval,
        );
        Self { config, api }
    }

    /// Run the pipeline on one raw inbound message and return the reply,
    /// ready for the relay.
    pub async fn process(&self, raw: &[u8]) -> Result<Message> {
        let msg = mail::parse(raw)?;

        let attachments = mail::extract_attachments(&msg, self.config.max_attachments);
        info!(count = attachments.len(), "Submitting attachments");

        let mut jobs = Vec::with_capacity(attachments.len());
        for Attachment { filename, bytes } in attachments {
            tokio::time::sleep(self.config.submit_delay).await;
            let job_id = self.api.submit(&filename, bytes).await?;
            info!(%job_id, filename, "Document submitted");
            jobs.push((filename, job_id));
        }

        let mut docs = Vec::with_capacity(jobs.len());
        for (filename, job_id) in jobs {
            let result = self.api.wait_for_result(&job_id).await?;
            info!(%job_id, status = %result.status, "Job finished");
            docs.push(DocumentReport { filename, result });
        }

        let csv = report::render_csv(&docs)?;
        let report_name = report::report_filename(chrono::Utc::now());
        let reply = mail::build_reply(
            &msg,
            &self.config.from_address,
            self.config.bcc.as_deref(),
            &csv,
            &report_name,
        )?;
        Ok(reply)
    }

    /// Hand a built reply to the local relay.
    pub fn send(&self, reply: &Message) -> Result<()> {
        mail::send_reply(&self.config.smtp_host, self.config.smtp_port, reply)?;
        Ok(())
    }
}
