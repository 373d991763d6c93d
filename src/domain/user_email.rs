use validator::ValidateEmail;

/// A parsed email address, used for both recipients and the admin address.
/// There is no way to construct one with an empty or malformed address, so a
/// `MailTask` can never be enqueued without a usable recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEmail(String);

impl UserEmail {
    pub fn parse(email: String) -> Result<Self, String> {
        let email = email.trim().to_string();
        ValidateEmail::validate_email(&email)
            .then_some(Self(email.clone()))
            .ok_or(format!("Invalid email: {email:?}"))
    }

    /// Evaluate `candidates` in order, returning the first one that parses.
    /// Missing and invalid candidates are both skipped.
    pub fn resolve<I>(candidates: I) -> Option<Self>
    where
        I: IntoIterator<Item = Option<String>>,
    {
        candidates
            .into_iter()
            .flatten()
            .find_map(|c| Self::parse(c).ok())
    }
}

impl AsRef<str> for UserEmail {
    fn as_ref(&self) -> &str { &self.0 }
}

impl std::fmt::Display for UserEmail {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
