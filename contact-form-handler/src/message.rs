use crate::{
    delivery::{OutboundMessage, ReplyTo},
    submission::CanonicalFields,
};
use serde::Serialize;
use serde_json::Value;
use tinytemplate::{error::Error, format, format_unescaped, TinyTemplate};

const NOTIFICATION_HTML_TEMPLATE_NAME: &str = "notification-html";
const NOTIFICATION_TEXT_TEMPLATE_NAME: &str = "notification-text";
const AUTO_REPLY_TEMPLATE_NAME: &str = "auto-reply";
const NOTIFICATION_HTML_TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/contact-message.html"
));
const NOTIFICATION_TEXT_TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/contact-message.txt"
));
const AUTO_REPLY_TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/auto-reply.txt"
));

pub const NOTIFICATION_SUBJECT_PREFIX: &str = "[Contact]";
pub const AUTO_REPLY_SUBJECT: &str = "Thanks for getting in touch";

#[derive(Serialize)]
struct Context<'a> {
    name: &'a str,
    email: &'a str,
    subject: &'a str,
    message: &'a str,
}

impl<'a> From<&'a CanonicalFields> for Context<'a> {
    fn from(fields: &'a CanonicalFields) -> Self {
        Self {
            name: &fields.name,
            email: &fields.email,
            subject: &fields.subject,
            message: &fields.message,
        }
    }
}

/// Builds the message informing the site owner of an accepted submission.
pub fn compose_notification(
    fields: &CanonicalFields,
    from: &str,
    to: &str,
) -> Result<OutboundMessage, Error> {
    let context = Context::from(fields);
    Ok(OutboundMessage {
        from: from.into(),
        to: to.into(),
        reply_to: Some(ReplyTo {
            name: (!fields.name.is_empty()).then(|| fields.name.clone()),
            email: fields.email.clone(),
        }),
        subject: format!("{NOTIFICATION_SUBJECT_PREFIX} {}", fields.subject),
        text: render_text(NOTIFICATION_TEXT_TEMPLATE_NAME, NOTIFICATION_TEXT_TEMPLATE, &context)?,
        html: Some(render_html(&context)?),
    })
}

/// Builds the acknowledgement sent back to the submitter.
pub fn compose_auto_reply(fields: &CanonicalFields, from: &str) -> Result<OutboundMessage, Error> {
    Ok(OutboundMessage {
        from: from.into(),
        to: fields.email.clone(),
        reply_to: None,
        subject: AUTO_REPLY_SUBJECT.into(),
        text: render_text(
            AUTO_REPLY_TEMPLATE_NAME,
            AUTO_REPLY_TEMPLATE,
            &Context::from(fields),
        )?,
        html: None,
    })
}

fn render_html(context: &Context) -> Result<String, Error> {
    let mut tt = TinyTemplate::new();
    tt.add_formatter("render_paragraphs", render_paragraphs);
    tt.add_template(NOTIFICATION_HTML_TEMPLATE_NAME, NOTIFICATION_HTML_TEMPLATE)?;
    tt.render(NOTIFICATION_HTML_TEMPLATE_NAME, context)
}

fn render_text(name: &str, template: &'static str, context: &Context) -> Result<String, Error> {
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&format_unescaped);
    tt.add_template(name, template)?;
    tt.render(name, context)
}

fn render_paragraphs(value: &Value, output: &mut String) -> Result<(), Error> {
    output.push_str("<p>");
    let mut formatted = String::new();
    format(value, &mut formatted)?;
    output.push_str(&formatted.replace("\n\n", "</p><p>"));
    output.push_str("</p>");
    Ok(())
}
