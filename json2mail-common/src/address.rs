use std::{
    fmt::{self, Debug, Display},
    ops::{Deref, DerefMut},
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{
    address_parser::{self, AddressError, quote},
    string_list::StringList,
};

/// A parsed addr-spec (`local-part@domain`)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Mailbox {
    /// The local part (before @), quoted only when it is not a dot-atom
    pub local_part: String,
    /// The domain or domain literal (after @)
    pub domain: String,
}

impl Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

/// A single mailbox with an optional display name.
///
/// Formats as `"Display Name" <addr>` when a display name is present and as
/// the bare `addr` otherwise. Formatting canonicalises whitespace and quoting,
/// so the output is not byte-identical to the parsed input, but it always
/// parses back to an equal [`Address`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address {
    display_name: Option<String>,
    mailbox: Mailbox,
}

impl Address {
    /// An empty display name is treated as absent.
    #[must_use]
    pub fn new(display_name: Option<String>, mailbox: Mailbox) -> Self {
        Self {
            display_name: display_name.filter(|name| !name.is_empty()),
            mailbox,
        }
    }

    /// Parse exactly one mailbox.
    ///
    /// # Errors
    ///
    /// Returns an [`AddressError`] if `text` holds zero or several mailboxes,
    /// or is not valid address syntax.
    pub fn parse(text: &str) -> Result<Self, AddressError> {
        address_parser::parse_address(text)
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    #[must_use]
    pub const fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Canonical textual form, as used in headers and JSON output.
    #[must_use]
    pub fn format(&self) -> String {
        self.to_string()
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(name) => write!(f, "{} <{}>", quote(name), self.mailbox),
            None => Display::fmt(&self.mailbox, f),
        }
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Mailbox> for Address {
    fn from(value: Mailbox) -> Self {
        Self::new(None, value)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(|err| de::Error::custom(format!("{text:?}: {err}")))
    }
}

/// An ordered list of addresses; duplicates are kept.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressList(pub Vec<Address>);

impl AddressList {
    /// Parse every entry as a full address list, concatenating the results.
    ///
    /// Entries without any address (empty or blank strings) are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first [`AddressError`] other than "no address".
    pub fn parse<I, S>(entries: I) -> Result<Self, AddressError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut addresses = Vec::new();

        for entry in entries {
            match address_parser::parse_address_list(entry.as_ref()) {
                Ok(parsed) => addresses.extend(parsed),
                Err(AddressError::NoAddress) => {}
                Err(err) => return Err(err),
            }
        }

        Ok(Self(addresses))
    }

    /// Canonical textual form of every address, in order.
    #[must_use]
    pub fn format(&self) -> Vec<String> {
        self.iter().map(Address::format).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for AddressList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, addr) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            Display::fmt(addr, f)?;
        }
        Ok(())
    }
}

impl From<Vec<Address>> for AddressList {
    fn from(value: Vec<Address>) -> Self {
        Self(value)
    }
}

impl FromIterator<Address> for AddressList {
    fn from_iter<T: IntoIterator<Item = Address>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Deref for AddressList {
    type Target = Vec<Address>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for AddressList {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Serialize for AddressList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for AddressList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = StringList::deserialize(deserializer)?;
        let mut addresses = Vec::new();

        for entry in entries.iter() {
            let parsed = Self::parse([entry])
                .map_err(|err| de::Error::custom(format!("{entry:?}: {err}")))?;
            addresses.extend(parsed.0);
        }

        Ok(Self(addresses))
    }
}
