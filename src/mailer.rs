//! Account mail: activation links and password reset links.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;
use url::Url;

use crate::config::MailConfig;
use crate::users::User;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub from: String,
    pub to: Vec<String>,
    pub text_body: String,
    pub html_body: String,
}

#[async_trait]
pub trait MailDelivery: Send + Sync {
    async fn deliver(&self, message: &Message) -> anyhow::Result<()>;
}

/// Writes outgoing mail to the log instead of sending it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDelivery;

#[async_trait]
impl MailDelivery for LogDelivery {
    async fn deliver(&self, message: &Message) -> anyhow::Result<()> {
        info!(
            to = ?message.to,
            subject = %message.subject,
            body = %message.text_body,
            "mail delivered"
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct UserMailer {
    sender: String,
    base_url: Url,
    delivery: Arc<dyn MailDelivery>,
}

impl UserMailer {
    pub fn new(config: &MailConfig, delivery: Arc<dyn MailDelivery>) -> anyhow::Result<Self> {
        let mut base_url = Url::parse(&config.base_url)
            .with_context(|| format!("invalid APP_BASE_URL: {}", config.base_url))?;
        // Relative joins replace the last segment unless the path ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            sender: config.sender.clone(),
            base_url,
            delivery,
        })
    }

    /// `<base>/<path>/<token>?email=<escaped email>`, keeping any path prefix
    /// of the base URL.
    fn token_link(&self, path: &str, token: &str, email: &str) -> anyhow::Result<Url> {
        let mut url = self
            .base_url
            .join(&format!("{path}/{token}"))
            .context("building mail link")?;
        url.query_pairs_mut().append_pair("email", email);
        Ok(url)
    }

    fn message(&self, user: &User, subject: &str, text_body: String, html_body: String) -> Message {
        Message {
            subject: subject.to_string(),
            from: self.sender.clone(),
            to: vec![user.email.clone()],
            text_body,
            html_body,
        }
    }

    pub fn account_activation(&self, user: &User) -> anyhow::Result<Message> {
        let token = user
            .activation_token
            .as_deref()
            .context("user has no activation token")?;
        let link = self.token_link("account_activations", token, &user.email)?;
        let text = format!(
            "Hi {name},\n\nWelcome to the Sample App! Click on the link below to activate your account:\n\n{link}\n",
            name = user.name,
        );
        let html = format!(
            "<h1>Sample App</h1>\n<p>Hi {name},</p>\n<p>Welcome to the Sample App! Click on the link below to activate your account:</p>\n<a href=\"{link}\">Activate</a>\n",
            name = user.name,
        );
        Ok(self.message(user, "Account activation", text, html))
    }

    pub fn password_reset(&self, user: &User) -> anyhow::Result<Message> {
        let token = user
            .reset_token
            .as_deref()
            .context("user has no reset token")?;
        let link = self.token_link("password_resets", token, &user.email)?;
        let text = format!(
            "To reset your password click the link below:\n\n{link}\n\nThis link will expire in two hours.\n\nIf you did not request your password to be reset, please ignore this email and your password will stay as it is.\n"
        );
        let html = format!(
            "<h1>Password reset</h1>\n<p>To reset your password click the link below:</p>\n<a href=\"{link}\">Reset password</a>\n<p>This link will expire in two hours.</p>\n<p>If you did not request your password to be reset, please ignore this email and your password will stay as it is.</p>\n"
        );
        Ok(self.message(user, "Password reset", text, html))
    }

    pub async fn send_account_activation(&self, user: &User) -> anyhow::Result<()> {
        let message = self.account_activation(user)?;
        self.delivery.deliver(&message).await
    }

    pub async fn send_password_reset(&self, user: &User) -> anyhow::Result<()> {
        let message = self.password_reset(user)?;
        self.delivery.deliver(&message).await
    }
}

/// Keeps delivered messages for inspection in tests.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    sent: Arc<std::sync::Mutex<Vec<Message>>>,
}

#[cfg(test)]
impl Outbox {
    pub fn messages(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Message> {
        self.sent.lock().unwrap().last().cloned()
    }
}

#[cfg(test)]
#[async_trait]
impl MailDelivery for Outbox {
    async fn deliver(&self, message: &Message) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::new_token;

    fn mailer_at(base_url: &str, outbox: &Outbox) -> UserMailer {
        let config = MailConfig {
            sender: "noreply@example.com".into(),
            base_url: base_url.into(),
        };
        UserMailer::new(&config, Arc::new(outbox.clone())).unwrap()
    }

    fn mailer(outbox: &Outbox) -> UserMailer {
        mailer_at("http://localhost:8080", outbox)
    }

    fn michael() -> User {
        User::new("Michael Example", "michael+test@example.com", "password", "password")
    }

    #[test]
    fn account_activation_embeds_token_and_escaped_email() {
        let mut user = michael();
        user.activation_token = Some(new_token());
        let msg = mailer(&Outbox::default()).account_activation(&user).unwrap();

        assert_eq!(msg.subject, "Account activation");
        assert_eq!(msg.to, vec![user.email.clone()]);
        assert_eq!(msg.from, "noreply@example.com");
        assert!(msg.text_body.contains("Michael Example"));
        assert!(msg.text_body.contains(user.activation_token.as_deref().unwrap()));
        assert!(msg.text_body.contains("email=michael%2Btest%40example.com"));
        assert!(msg.html_body.contains("/account_activations/"));
    }

    #[test]
    fn password_reset_embeds_token_and_escaped_email() {
        let mut user = michael();
        user.reset_token = Some(new_token());
        let msg = mailer(&Outbox::default()).password_reset(&user).unwrap();

        assert_eq!(msg.subject, "Password reset");
        assert_eq!(msg.to, vec![user.email.clone()]);
        assert_eq!(msg.from, "noreply@example.com");
        assert!(msg.text_body.contains(user.reset_token.as_deref().unwrap()));
        assert!(msg.text_body.contains("michael%2Btest%40example.com"));
    }

    #[test]
    fn links_keep_the_base_path() {
        let mut user = michael();
        user.activation_token = Some("tok".into());
        user.reset_token = Some("tok".into());

        for base in ["https://example.com/api/v1", "https://example.com/api/v1/"] {
            let mailer = mailer_at(base, &Outbox::default());
            let activation = mailer.account_activation(&user).unwrap();
            assert!(activation.text_body.contains(
                "https://example.com/api/v1/account_activations/tok?email=michael%2Btest%40example.com"
            ));
            let reset = mailer.password_reset(&user).unwrap();
            assert!(reset
                .text_body
                .contains("https://example.com/api/v1/password_resets/tok?email="));
        }
    }

    #[test]
    fn missing_token_is_an_error() {
        let err = mailer(&Outbox::default()).password_reset(&michael()).unwrap_err();
        assert!(err.to_string().contains("reset token"));
    }

    #[test]
    fn rejects_an_unparseable_base_url() {
        let config = MailConfig {
            sender: "noreply@example.com".into(),
            base_url: "not a url".into(),
        };
        assert!(UserMailer::new(&config, Arc::new(LogDelivery)).is_err());
    }

    #[tokio::test]
    async fn send_hands_the_message_to_delivery() {
        let outbox = Outbox::default();
        let mut user = michael();
        user.activation_token = Some(new_token());
        mailer(&outbox).send_account_activation(&user).await.unwrap();

        assert_eq!(outbox.messages().len(), 1);
        assert_eq!(outbox.last().unwrap().subject, "Account activation");
    }
}
