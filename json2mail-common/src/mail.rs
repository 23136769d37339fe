//! The mail record decoded from each JSON object of the input stream.

use std::{
    collections::VecDeque,
    fmt,
    fs::File,
    ops::Deref,
    path::{Path, PathBuf},
};

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{MapAccess, SeqAccess, Visitor, value::MapAccessDeserializer},
};

use crate::{
    address::{Address, AddressList},
    error::ValidationError,
    string_list::StringList,
};

/// One mail message description.
///
/// Every field is optional on input. `to`, `cc` and `bcc` accept a string or
/// an array of strings, each of which may hold several comma-separated
/// addresses. Empty fields are omitted on output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mail {
    #[serde(skip_serializing_if = "AddressList::is_empty")]
    pub to: AddressList,

    #[serde(skip_serializing_if = "AddressList::is_empty")]
    pub cc: AddressList,

    #[serde(skip_serializing_if = "AddressList::is_empty")]
    pub bcc: AddressList,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,

    #[serde(
        skip_serializing_if = "String::is_empty",
        deserialize_with = "null_as_empty"
    )]
    pub subject: String,

    #[serde(
        skip_serializing_if = "String::is_empty",
        deserialize_with = "null_as_empty"
    )]
    pub body: String,

    /// Filesystem paths of files to attach.
    #[serde(skip_serializing_if = "StringList::is_empty")]
    pub attachments: StringList,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Mail {
    /// Check that the record can be handed to a transport.
    ///
    /// Attachments are checked in order; each one is opened once to confirm
    /// it exists and is readable. The file may still vanish before sending.
    ///
    /// # Errors
    ///
    /// [`ValidationError::MissingRecipient`] when `to` is empty, otherwise
    /// [`ValidationError::AttachmentNotFound`] for the first bad attachment.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.to.is_empty() {
            return Err(ValidationError::MissingRecipient);
        }

        if let Some(missing) = self.attachments.iter().find(|path| !is_readable_file(path)) {
            return Err(ValidationError::AttachmentNotFound(PathBuf::from(missing)));
        }

        Ok(())
    }

    /// Envelope recipients: `to`, then `cc`, then `bcc`.
    pub fn recipients(&self) -> impl Iterator<Item = &Address> {
        self.to.iter().chain(self.cc.iter()).chain(self.bcc.iter())
    }
}

fn is_readable_file(path: impl AsRef<Path>) -> bool {
    File::open(path)
        .and_then(|file| file.metadata())
        .is_ok_and(|metadata| metadata.is_file())
}

/// The records produced by one top-level JSON value.
///
/// Decodes from an array of mail objects, from a single mail object (as a
/// one-element list) or from `null` (as an empty list). Always encodes as a
/// JSON array.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MailList(pub Vec<Mail>);

impl MailList {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Validate every record, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// The first [`ValidationError`] encountered.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.iter().try_for_each(Mail::validate)
    }
}

impl Deref for MailList {
    type Target = Vec<Mail>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<MailList> for VecDeque<Mail> {
    fn from(value: MailList) -> Self {
        value.0.into()
    }
}

impl Serialize for MailList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

struct MailListVisitor;

impl<'de> Visitor<'de> for MailListVisitor {
    type Value = MailList;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a mail object or an array of mail objects")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut mails = Vec::with_capacity(seq.size_hint().unwrap_or_default());
        while let Some(mail) = seq.next_element::<Mail>()? {
            mails.push(mail);
        }
        Ok(MailList(mails))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
        let mail = Mail::deserialize(MapAccessDeserializer::new(map))?;
        Ok(MailList(vec![mail]))
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
        Ok(MailList::default())
    }
}

impl<'de> Deserialize<'de> for MailList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MailListVisitor)
    }
}
