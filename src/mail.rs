//! Inbound MIME decomposition and outbound reply composition.
//!
//! Inbound parsing via mail-parser; the reply is a `multipart/mixed`
//! message carrying the CSV report, built with lettre and handed to the
//! local relay over plain SMTP.

use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart};
use lettre::{Message, SmtpTransport, Transport};
use mail_parser::{MessageParser, MimeHeaders, PartType};

use crate::error::MailError;

/// Subject used when the inbound message has none.
const DEFAULT_SUBJECT: &str = "(document submission)";

/// A non-text attachment lifted out of the inbound message.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Parse a raw RFC 5322 message.
pub fn parse(raw: &[u8]) -> Result<mail_parser::Message<'_>, MailError> {
    MessageParser::default()
        .parse(raw)
        .ok_or(MailError::Unparseable)
}

/// Collect document attachments in message order, capped at `max`.
///
/// `multipart/*` and `message/*` parts are containers and `text/*` parts
/// are message body; neither is a document itself. Forwarded
/// `message/rfc822` parts are descended into so their attachments are
/// collected too. Parts without a declared content type default to
/// `text/plain` and are skipped.
pub fn extract_attachments(msg: &mail_parser::Message<'_>, max: usize) -> Vec<Attachment> {
    let mut out = Vec::new();
    collect_attachments(msg, max, &mut out);
    out
}

/// Walk one message level; the cap is shared across nesting levels.
fn collect_attachments(msg: &mail_parser::Message<'_>, max: usize, out: &mut Vec<Attachment>) {
    for part in msg.attachments() {
        if out.len() >= max {
            return;
        }
        if let PartType::Message(nested) = &part.body {
            collect_attachments(nested, max, out);
            continue;
        }
        let Some(ct) = MimeHeaders::content_type(part) else {
            continue;
        };
        let maintype = ct.ctype();
        if maintype.eq_ignore_ascii_case("text")
            || maintype.eq_ignore_ascii_case("multipart")
            || maintype.eq_ignore_ascii_case("message")
        {
            continue;
        }
        let filename = MimeHeaders::attachment_name(part)
            .map(str::to_string)
            .unwrap_or_else(|| format!("attachment-{}", out.len() + 1));
        out.push(Attachment {
            filename,
            bytes: part.contents().to_vec(),
        });
    }
}

/// Address the reply goes to: Reply-To if present, else From.
pub fn reply_target(msg: &mail_parser::Message<'_>) -> Result<String, MailError> {
    msg.reply_to()
        .and_then(first_address)
        .or_else(|| msg.from().and_then(first_address))
        .ok_or(MailError::NoReplyAddress)
}

fn first_address(addr: &mail_parser::Address<'_>) -> Option<String> {
    addr.first()
        .and_then(|a| a.address())
        .map(|s| s.to_string())
}

/// Subject of the reply.
pub fn reply_subject(msg: &mail_parser::Message<'_>) -> String {
    format!("Re: {}", msg.subject().unwrap_or(DEFAULT_SUBJECT))
}

/// Build the reply: a `multipart/mixed` message with the CSV report
/// attached as `report_name`.
pub fn build_reply(
    msg: &mail_parser::Message<'_>,
    from_address: &str,
    bcc: Option<&str>,
    csv: &str,
    report_name: &str,
) -> Result<Message, MailError> {
    let to = reply_target(msg)?;

    let mut builder = Message::builder()
        .from(parse_mailbox(from_address)?)
        .to(parse_mailbox(&to)?)
        .subject(reply_subject(msg));
    if let Some(addr) = bcc {
        builder = builder.bcc(parse_mailbox(addr)?);
    }

    let content_type = ContentType::parse("text/csv")
        .map_err(|e| MailError::Build(format!("Invalid report content type: {e}")))?;
    let report = lettre::message::Attachment::new(report_name.to_string())
        .body(csv.to_string(), content_type);

    builder
        .multipart(MultiPart::mixed().singlepart(report))
        .map_err(|e| MailError::Build(e.to_string()))
}

fn parse_mailbox(addr: &str) -> Result<Mailbox, MailError> {
    addr.parse().map_err(|e: lettre::address::AddressError| {
        MailError::InvalidAddress {
            address: addr.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Hand the reply to the local relay. Plain SMTP, no auth.
pub fn send_reply(smtp_host: &str, smtp_port: u16, message: &Message) -> Result<(), MailError> {
    let transport = SmtpTransport::builder_dangerous(smtp_host)
        .port(smtp_port)
        .build();
    transport
        .send(message)
        .map_err(|e| MailError::Send(e.to_string()))?;
    tracing::info!(
        recipients = message.envelope().to().len(),
        "Report handed to relay"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARY: &str = "=-docgate-test";

    fn mixed_message(reply_to: Option<&str>, subject: Option<&str>, parts: &[&str]) -> String {
        let mut raw = String::new();
        raw.push_str("From: Alice <alice@example.com>\r\n");
        if let Some(addr) = reply_to {
            raw.push_str(&format!("Reply-To: {addr}\r\n"));
        }
        raw.push_str("To: invoices@gateway.test\r\n");
        if let Some(subject) = subject {
            raw.push_str(&format!("Subject: {subject}\r\n"));
        }
        raw.push_str("MIME-Version: 1.0\r\n");
        raw.push_str(&format!(
            "Content-Type: multipart/mixed; boundary=\"{BOUNDARY}\"\r\n\r\n"
        ));
        for part in parts {
            raw.push_str(&format!("--{BOUNDARY}\r\n"));
            raw.push_str(part);
        }
        raw.push_str(&format!("--{BOUNDARY}--\r\n"));
        raw
    }

    const TEXT_BODY: &str = "Content-Type: text/plain\r\n\r\nPlease process the attached.\r\n";

    // "JVBERi0xLjQK" is base64 for "%PDF-1.4\n".
    fn pdf_part(filename: &str) -> String {
        format!(
            "Content-Type: application/pdf\r\n\
             Content-Disposition: attachment; filename=\"{filename}\"\r\n\
             Content-Transfer-Encoding: base64\r\n\r\n\
             JVBERi0xLjQK\r\n"
        )
    }

    // ── Attachment extraction ───────────────────────────────────────

    #[test]
    fn extracts_binary_attachment() {
        let raw = mixed_message(None, Some("March invoices"), &[
            TEXT_BODY,
            &pdf_part("invoice-1.pdf"),
        ]);
        let msg = parse(raw.as_bytes()).unwrap();
        let attachments = extract_attachments(&msg, 15);
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename, "invoice-1.pdf");
        assert!(attachments[0].bytes.starts_with(b"%PDF-1.4"));
    }

    #[test]
    fn skips_text_attachment() {
        let notes = "Content-Type: text/plain\r\n\
                     Content-Disposition: attachment; filename=\"notes.txt\"\r\n\r\n\
                     remember the milk\r\n";
        let raw = mixed_message(None, Some("Docs"), &[
            TEXT_BODY,
            notes,
            &pdf_part("invoice-1.pdf"),
        ]);
        let msg = parse(raw.as_bytes()).unwrap();
        let attachments = extract_attachments(&msg, 15);
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename, "invoice-1.pdf");
    }

    #[test]
    fn truncates_at_max_without_error() {
        let a = pdf_part("a.pdf");
        let b = pdf_part("b.pdf");
        let c = pdf_part("c.pdf");
        let raw = mixed_message(None, Some("Docs"), &[TEXT_BODY, &a, &b, &c]);
        let msg = parse(raw.as_bytes()).unwrap();
        let attachments = extract_attachments(&msg, 2);
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].filename, "a.pdf");
        assert_eq!(attachments[1].filename, "b.pdf");
    }

    #[test]
    fn nameless_attachment_gets_generated_name() {
        let anon = "Content-Type: application/octet-stream\r\n\
                    Content-Transfer-Encoding: base64\r\n\r\n\
                    JVBERi0xLjQK\r\n";
        let raw = mixed_message(None, Some("Docs"), &[TEXT_BODY, anon]);
        let msg = parse(raw.as_bytes()).unwrap();
        let attachments = extract_attachments(&msg, 15);
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename, "attachment-1");
    }

    fn forwarded_part(pdf: &str) -> String {
        format!(
            "Content-Type: message/rfc822\r\n\r\n\
             From: Bob <bob@example.com>\r\n\
             To: alice@example.com\r\n\
             Subject: FW: invoice\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: multipart/mixed; boundary=\"inner\"\r\n\r\n\
             --inner\r\n\
             Content-Type: text/plain\r\n\r\n\
             See attached.\r\n\
             --inner\r\n\
             {pdf}\
             --inner--\r\n"
        )
    }

    #[test]
    fn forwarded_message_attachment_is_unwrapped() {
        let fwd = forwarded_part(&pdf_part("invoice-1.pdf"));
        let raw = mixed_message(None, Some("FW: invoice"), &[TEXT_BODY, &fwd]);
        let msg = parse(raw.as_bytes()).unwrap();
        let attachments = extract_attachments(&msg, 15);
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename, "invoice-1.pdf");
        assert!(attachments[0].bytes.starts_with(b"%PDF-1.4"));
    }

    #[test]
    fn cap_is_shared_across_forwarded_messages() {
        let outer = pdf_part("a.pdf");
        let fwd = forwarded_part(&pdf_part("b.pdf"));
        let raw = mixed_message(None, Some("FW: invoices"), &[TEXT_BODY, &outer, &fwd]);
        let msg = parse(raw.as_bytes()).unwrap();

        let capped = extract_attachments(&msg, 1);
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].filename, "a.pdf");

        let all = extract_attachments(&msg, 15);
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].filename, "b.pdf");
    }

    #[test]
    fn body_only_message_has_no_attachments() {
        let raw = mixed_message(None, Some("Hello"), &[TEXT_BODY]);
        let msg = parse(raw.as_bytes()).unwrap();
        assert!(extract_attachments(&msg, 15).is_empty());
    }

    // ── Reply addressing ────────────────────────────────────────────

    #[test]
    fn reply_target_prefers_reply_to() {
        let raw = mixed_message(Some("billing@example.com"), Some("Docs"), &[TEXT_BODY]);
        let msg = parse(raw.as_bytes()).unwrap();
        assert_eq!(reply_target(&msg).unwrap(), "billing@example.com");
    }

    #[test]
    fn reply_target_falls_back_to_from() {
        let raw = mixed_message(None, Some("Docs"), &[TEXT_BODY]);
        let msg = parse(raw.as_bytes()).unwrap();
        assert_eq!(reply_target(&msg).unwrap(), "alice@example.com");
    }

    #[test]
    fn reply_target_missing_is_an_error() {
        let raw = "To: invoices@gateway.test\r\nSubject: Hi\r\n\r\nbody\r\n";
        let msg = parse(raw.as_bytes()).unwrap();
        assert!(matches!(
            reply_target(&msg),
            Err(MailError::NoReplyAddress)
        ));
    }

    #[test]
    fn reply_subject_prefixes_re() {
        let raw = mixed_message(None, Some("March invoices"), &[TEXT_BODY]);
        let msg = parse(raw.as_bytes()).unwrap();
        assert_eq!(reply_subject(&msg), "Re: March invoices");
    }

    #[test]
    fn reply_subject_fallback_when_missing() {
        let raw = mixed_message(None, None, &[TEXT_BODY]);
        let msg = parse(raw.as_bytes()).unwrap();
        assert_eq!(reply_subject(&msg), "Re: (document submission)");
    }

    // ── Reply composition ───────────────────────────────────────────

    #[test]
    fn build_reply_carries_csv_attachment() {
        let raw = mixed_message(Some("billing@example.com"), Some("Docs"), &[TEXT_BODY]);
        let msg = parse(raw.as_bytes()).unwrap();
        let reply = build_reply(
            &msg,
            "Document Gateway <docgate@localhost>",
            None,
            "filename,status,preview\n",
            "260305T070911.csv",
        )
        .unwrap();

        let formatted = String::from_utf8(reply.formatted()).unwrap();
        assert!(formatted.contains("Subject: Re: Docs"));
        assert!(formatted.contains("To: billing@example.com"));
        assert!(formatted.contains("text/csv"));
        assert!(formatted.contains("260305T070911.csv"));
        assert!(formatted.contains("filename,status,preview"));
    }

    #[test]
    fn build_reply_bcc_in_envelope() {
        let raw = mixed_message(None, Some("Docs"), &[TEXT_BODY]);
        let msg = parse(raw.as_bytes()).unwrap();
        let reply = build_reply(
            &msg,
            "docgate@localhost",
            Some("debug@example.com"),
            "filename,status,preview\n",
            "report.csv",
        )
        .unwrap();

        let recipients: Vec<String> = reply
            .envelope()
            .to()
            .iter()
            .map(|a| a.to_string())
            .collect();
        assert!(recipients.contains(&"alice@example.com".to_string()));
        assert!(recipients.contains(&"debug@example.com".to_string()));
    }

    #[test]
    fn build_reply_invalid_from_is_an_error() {
        let raw = mixed_message(None, Some("Docs"), &[TEXT_BODY]);
        let msg = parse(raw.as_bytes()).unwrap();
        let result = build_reply(&msg, "not an address", None, "csv", "report.csv");
        assert!(matches!(result, Err(MailError::InvalidAddress { .. })));
    }

    #[test]
    fn parse_garbage_is_an_error() {
        assert!(matches!(parse(&[]), Err(MailError::Unparseable)));
    }
}
