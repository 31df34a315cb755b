use crate::error::{Result, TrellisError};
use crate::http::HttpMethod;
use dashmap::DashMap;
use std::collections::HashMap;

/// The registered role of a component. A token has at most one class type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ClassType {
    Controller,
    Provider,
    Command,
    Service,
}

/// A single route of a controller. Paths are normalized to start with "/";
/// the position in [`ControllerDetails::routes`] is the mount order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub path: String,
    pub action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionDetails {
    pub method: HttpMethod,
}

#[derive(Debug, Clone, Default)]
pub struct ControllerDetails {
    pub name: String,
    pub prefix: String,
    pub routes: Vec<RouteEntry>,
    pub actions: HashMap<String, ActionDetails>,
}

#[derive(Debug, Clone, Default)]
pub struct ProviderDetails {
    pub name: String,
    pub middleware_method: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CommandDetails {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKey {
    ClassType,
    Controller,
    Provider,
    Command,
}

#[derive(Debug, Clone)]
pub enum Metadata {
    ClassType(ClassType),
    Controller(ControllerDetails),
    Provider(ProviderDetails),
    Command(CommandDetails),
}

impl Metadata {
    fn key(&self) -> MetadataKey {
        match self {
            Metadata::ClassType(_) => MetadataKey::ClassType,
            Metadata::Controller(_) => MetadataKey::Controller,
            Metadata::Provider(_) => MetadataKey::Provider,
            Metadata::Command(_) => MetadataKey::Command,
        }
    }
}

/// Per-component registration metadata, keyed by token id and kind.
///
/// This is an explicit object owned by the application and written by the
/// registration builders at composition time; reading happens when
/// controllers, providers and commands are mounted.
#[derive(Default)]
pub struct MetadataRegistry {
    entries: DashMap<(&'static str, MetadataKey), Metadata>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_class_metadata(&self, token_id: &'static str, value: Metadata) -> Result<()> {
        let key = value.key();
        if key == MetadataKey::ClassType && self.has_class_metadata(token_id, key) {
            return Err(TrellisError::DuplicateClassType {
                token: token_id.to_string(),
            });
        }
        self.entries.insert((token_id, key), value);
        Ok(())
    }

    pub fn get_class_metadata(&self, token_id: &'static str, key: MetadataKey) -> Option<Metadata> {
        self.entries
            .get(&(token_id, key))
            .map(|entry| entry.value().clone())
    }

    pub fn has_class_metadata(&self, token_id: &'static str, key: MetadataKey) -> bool {
        self.entries.contains_key(&(token_id, key))
    }

    pub fn class_type(&self, token_id: &'static str) -> Option<ClassType> {
        match self.get_class_metadata(token_id, MetadataKey::ClassType) {
            Some(Metadata::ClassType(class_type)) => Some(class_type),
            _ => None,
        }
    }

    pub fn controller_details(&self, token_id: &'static str) -> Option<ControllerDetails> {
        match self.get_class_metadata(token_id, MetadataKey::Controller) {
            Some(Metadata::Controller(details)) => Some(details),
            _ => None,
        }
    }

    pub fn provider_details(&self, token_id: &'static str) -> Option<ProviderDetails> {
        match self.get_class_metadata(token_id, MetadataKey::Provider) {
            Some(Metadata::Provider(details)) => Some(details),
            _ => None,
        }
    }

    pub fn command_details(&self, token_id: &'static str) -> Option<CommandDetails> {
        match self.get_class_metadata(token_id, MetadataKey::Command) {
            Some(Metadata::Command(details)) => Some(details),
            _ => None,
        }
    }
}
