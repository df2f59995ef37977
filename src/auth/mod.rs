pub mod mailer;
pub mod oauth;
pub mod oauth1;
pub mod password;
pub mod service;
pub mod session;

pub use mailer::{LogMailer, Mailer};
pub use oauth::{Grant, IdentityProvider, LoginStart, OAuth2Provider, ProviderKind, SocialProfile};
pub use oauth1::OAuth1Provider;
pub use service::{AuthService, NewAccount, Session};
