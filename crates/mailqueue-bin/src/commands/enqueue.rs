//! `mailqueue enqueue`: add an email from the shell.

use super::AppContext;
use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};
use mailqueue_database::{EmailFormat, EmailRecipients, EnqueueOptions, JsonMap};
use serde_json::Value;

#[derive(Args, Debug)]
pub struct EnqueueArgs {
    /// Recipient address (repeatable)
    #[arg(long, required = true)]
    pub to: Vec<String>,

    /// Carbon-copy address (repeatable)
    #[arg(long)]
    pub cc: Vec<String>,

    /// Blind carbon-copy address (repeatable)
    #[arg(long)]
    pub bcc: Vec<String>,

    /// Reply-to address (repeatable)
    #[arg(long)]
    pub reply_to: Vec<String>,

    #[arg(long, default_value = "")]
    pub subject: String,

    /// Template variables as a JSON object
    #[arg(long, default_value = "{}")]
    pub data: String,

    /// Earliest delivery time (RFC 3339). Defaults to now
    #[arg(long)]
    pub send_at: Option<String>,

    #[arg(long, default_value = "default")]
    pub template: String,

    #[arg(long, default_value = "default")]
    pub layout: String,

    #[arg(long, default_value = "")]
    pub theme: String,

    #[arg(long, value_enum, default_value_t = FormatArg::Both)]
    pub format: FormatArg,

    /// Email config (sender profile) name
    #[arg(long, default_value = "default")]
    pub config: String,

    /// Transport header as NAME=VALUE (repeatable)
    #[arg(long)]
    pub header: Vec<String>,
}

/// Body formats accepted by `--format`.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatArg {
    Html,
    Text,
    Both,
}

impl From<FormatArg> for EmailFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Html => EmailFormat::Html,
            FormatArg::Text => EmailFormat::Text,
            FormatArg::Both => EmailFormat::Both,
        }
    }
}

pub async fn run(ctx: &AppContext, args: EnqueueArgs) -> anyhow::Result<()> {
    let (recipients, data, options) = build_request(args)?;
    let store = ctx.open_store().await?;
    let id = store.enqueue(recipients, data, options).await?;
    println!("{}", id);
    Ok(())
}

fn build_request(args: EnqueueArgs) -> anyhow::Result<(EmailRecipients, JsonMap, EnqueueOptions)> {
    let data = parse_object(&args.data).context("invalid --data")?;
    let send_at = args.send_at.as_deref().map(parse_send_at).transpose()?;

    let mut headers = JsonMap::new();
    for raw in &args.header {
        let (name, value) = parse_header(raw)?;
        headers.insert(name, Value::String(value));
    }

    let recipients = EmailRecipients::to(args.to)
        .with_cc(args.cc)
        .with_bcc(args.bcc)
        .with_reply_to(args.reply_to);

    let options = EnqueueOptions {
        subject: args.subject,
        send_at,
        template: args.template,
        layout: args.layout,
        theme: args.theme,
        format: args.format.into(),
        headers,
        config: args.config,
    };

    Ok((recipients, data, options))
}

fn parse_object(raw: &str) -> anyhow::Result<JsonMap> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => bail!("expected a JSON object, got {}", other),
    }
}

fn parse_send_at(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .with_context(|| format!("invalid --send-at {:?}", raw))
}

fn parse_header(raw: &str) -> anyhow::Result<(String, String)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("header {:?} must look like NAME=VALUE", raw))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("header {:?} has an empty name", raw);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_context;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn args() -> EnqueueArgs {
        EnqueueArgs {
            to: vec!["a@example.com".to_string()],
            cc: Vec::new(),
            bcc: Vec::new(),
            reply_to: Vec::new(),
            subject: "Hello".to_string(),
            data: r#"{"name": "Ada"}"#.to_string(),
            send_at: None,
            template: "default".to_string(),
            layout: "default".to_string(),
            theme: String::new(),
            format: FormatArg::Text,
            config: "default".to_string(),
            header: vec!["X-Campaign = spring".to_string()],
        }
    }

    #[test]
    fn build_request_maps_every_option() {
        let mut input = args();
        input.send_at = Some("2030-01-02T03:04:05Z".to_string());
        input.cc = vec!["c@example.com".to_string()];

        let (recipients, data, options) = build_request(input).unwrap();
        assert_eq!(recipients.to.as_slice(), ["a@example.com".to_string()]);
        assert_eq!(recipients.cc.len(), 1);
        assert_eq!(data["name"], Value::String("Ada".to_string()));
        assert_eq!(options.subject, "Hello");
        assert_eq!(options.format, EmailFormat::Text);
        assert_eq!(options.headers["X-Campaign"], Value::String("spring".to_string()));
        assert_eq!(
            options.send_at,
            Some(Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap())
        );
    }

    #[test]
    fn data_must_be_an_object() {
        let mut input = args();
        input.data = "[1, 2]".to_string();
        assert!(build_request(input).is_err());
    }

    #[test]
    fn bad_header_and_time_are_rejected() {
        assert!(parse_header("no-equals").is_err());
        assert!(parse_header("=value").is_err());
        assert!(parse_send_at("tomorrow").is_err());
    }

    #[tokio::test]
    async fn enqueue_writes_to_store() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path());

        run(&ctx, args()).await.unwrap();

        let stats = ctx.open_store().await.unwrap().stats().await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.ready, 1);
    }
}
