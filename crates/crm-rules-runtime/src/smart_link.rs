//! Smart link clicks
//!
//! Resolves a smart link slug, counts the click, applies the link's contact
//! actions and builds the redirect target with the visitor's query string
//! carried over.

use crate::error::Result;
use crate::storage::{ContactStore, SmartLink, SmartLinkStore, Subscriber};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const REDIRECT_STATUS: u16 = 307;

/// Query parameters consumed by the link route itself
const ROUTE_PARAMS: [&str; 3] = ["fluentcrm", "route", "slug"];

/// Expands `{{...}}` placeholders for a contact
pub trait SmartCodeParser: Send + Sync {
    fn parse(&self, text: &str, contact: Option<&Subscriber>) -> String;
}

/// Leaves text untouched
pub struct NoSmartCodes;

impl SmartCodeParser for NoSmartCodes {
    fn parse(&self, text: &str, _contact: Option<&Subscriber>) -> String {
        text.to_string()
    }
}

/// Site user account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: u64,
    pub login: String,
    /// Can publish content; needs the high-level allowance to auto-login
    pub privileged: bool,
}

/// Site authentication surface used for auto-login
#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn is_logged_in(&self) -> bool;

    async fn user_by_email(&self, email: &str) -> Option<UserAccount>;

    /// Site policy for logging this contact in
    async fn login_allowed(&self, contact: &Subscriber) -> bool;

    /// Site policy for logging in privileged users
    async fn high_level_allowed(&self, contact: &Subscriber) -> bool;

    /// Contact identified by the visitor's session
    async fn current_contact_id(&self) -> Option<u64>;

    /// Start a session for the user
    async fn sign_on(&self, user: &UserAccount) -> bool;
}

/// Result of a handled click
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickOutcome {
    pub link: SmartLink,
    pub redirect_url: String,
    pub status: u16,
    pub auto_logged_in: bool,
}

pub struct SmartLinkHandler<'a, S: ?Sized, P: ?Sized, A: ?Sized> {
    store: &'a S,
    smart_codes: &'a P,
    auth: &'a A,
}

impl<'a, S, P, A> SmartLinkHandler<'a, S, P, A>
where
    S: ContactStore + SmartLinkStore + ?Sized,
    P: SmartCodeParser + ?Sized,
    A: AuthGateway + ?Sized,
{
    pub fn new(store: &'a S, smart_codes: &'a P, auth: &'a A) -> Self {
        Self {
            store,
            smart_codes,
            auth,
        }
    }

    /// Handle a click; `None` for an unknown slug.
    ///
    /// Without an explicit contact the session's contact is used.
    pub async fn handle_click(
        &self,
        slug: &str,
        contact: Option<Subscriber>,
        query: &[(String, String)],
    ) -> Result<Option<ClickOutcome>> {
        let Some(link) = self.store.smart_link(slug).await? else {
            debug!(slug, "unknown smart link");
            return Ok(None);
        };

        let contact = match contact {
            Some(contact) => Some(contact),
            None => match self.auth.current_contact_id().await {
                Some(id) => self.store.subscriber(id).await?,
                None => None,
            },
        };

        let link = self.store.record_click(link.id, contact.is_some()).await?;

        let mut auto_logged_in = false;
        if let Some(contact) = &contact {
            let actions = &link.actions;
            if !actions.tags.is_empty() {
                self.store.attach_tags(contact.id, &actions.tags).await?;
            }
            if !actions.lists.is_empty() {
                self.store.attach_lists(contact.id, &actions.lists).await?;
            }
            if !actions.remove_tags.is_empty() {
                self.store.detach_tags(contact.id, &actions.remove_tags).await?;
            }
            if !actions.remove_lists.is_empty() {
                self.store.detach_lists(contact.id, &actions.remove_lists).await?;
            }
            if actions.auto_login {
                auto_logged_in = self.auto_login(contact).await;
            }
        }

        let redirect_url = target_url(&link, query, contact.as_ref(), self.smart_codes);
        info!(
            slug,
            link_id = link.id,
            subscriber_id = contact.as_ref().map(|c| c.id),
            auto_logged_in,
            "smart link clicked"
        );

        Ok(Some(ClickOutcome {
            link,
            redirect_url,
            status: REDIRECT_STATUS,
            auto_logged_in,
        }))
    }

    /// Log the contact in as their site user when every check passes
    pub async fn auto_login(&self, contact: &Subscriber) -> bool {
        if self.auth.is_logged_in().await {
            return false;
        }
        let Some(user) = self.auth.user_by_email(&contact.email).await else {
            return false;
        };
        if !self.auth.login_allowed(contact).await {
            return false;
        }
        if user.privileged && !self.auth.high_level_allowed(contact).await {
            debug!(user_id = user.id, "privileged user, auto-login refused");
            return false;
        }
        if self.auth.current_contact_id().await != Some(contact.id) {
            return false;
        }
        self.auth.sign_on(&user).await
    }
}

/// Redirect target with the visitor's remaining query parameters appended
pub fn target_url<P: SmartCodeParser + ?Sized>(
    link: &SmartLink,
    query: &[(String, String)],
    contact: Option<&Subscriber>,
    smart_codes: &P,
) -> String {
    let mut url = if link.target_url.contains("{{") {
        smart_codes.parse(&link.target_url, contact)
    } else {
        link.target_url.clone()
    };

    let query_string = build_query(query);
    if !query_string.is_empty() {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&query_string);
    }
    url
}

/// Form-encode the parameters, skipping the link route's own
fn build_query(query: &[(String, String)]) -> String {
    query
        .iter()
        .filter(|(key, _)| !ROUTE_PARAMS.contains(&key.as_str()))
        .map(|(key, value)| format!("{}={}", form_encode(key), form_encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

fn form_encode(s: &str) -> String {
    urlencoding::encode(s).replace("%20", "+")
}
