//! Administrative edits to the package list and repo mappings.
//!
//! Requests are validated in full before anything is written, so a rejected
//! request never leaves a partial mutation behind.

use serde::Deserialize;
use store::types::{PackageList, RepoMappings};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ManageError {
    #[error("Invalid JSON body: {0}")]
    InvalidJson(String),

    #[error("Invalid action. Use \"add\", \"remove\", or \"set\".")]
    InvalidAction(String),

    #[error("Invalid payload. {0}")]
    InvalidPayload(&'static str),

    #[error("Failed to update {0}")]
    UpdateFailed(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Add,
    Remove,
    Set,
}

impl Action {
    fn parse(action: &str) -> Result<Self, ManageError> {
        match action {
            "add" => Ok(Action::Add),
            "remove" => Ok(Action::Remove),
            "set" => Ok(Action::Set),
            other => Err(ManageError::InvalidAction(other.to_string())),
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            Action::Add => "added",
            Action::Remove => "removed",
            Action::Set => "set",
        }
    }
}

/// POST body shared by both management endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ManageRequest {
    #[serde(default)]
    pub action: String,
    pub package: Option<String>,
    pub packages: Option<Vec<String>>,
    pub repo: Option<String>,
    pub mappings: Option<RepoMappings>,
}

impl ManageRequest {
    pub fn parse(body: &[u8]) -> Result<Self, ManageError> {
        serde_json::from_slice(body).map_err(|e| ManageError::InvalidJson(e.to_string()))
    }
}

/// Applies `request` to `current`, returning the new list.
pub fn edit_packages(
    current: &PackageList,
    request: ManageRequest,
) -> Result<(Action, PackageList), ManageError> {
    let action = Action::parse(&request.action)?;
    let mut updated = current.clone();

    match (action, request.packages, request.package) {
        (Action::Add, Some(packages), _) => {
            for package in &packages {
                updated.add(package);
            }
        }
        (Action::Add, None, Some(package)) => {
            updated.add(&package);
        }
        (Action::Remove, Some(packages), _) => {
            for package in &packages {
                updated.remove(package);
            }
        }
        (Action::Remove, None, Some(package)) => {
            updated.remove(&package);
        }
        (Action::Set, Some(packages), _) => updated = PackageList::new(packages),
        (Action::Add | Action::Remove, None, None) => {
            return Err(ManageError::InvalidPayload(
                "Provide \"package\" or \"packages\" array.",
            ));
        }
        (Action::Set, None, _) => {
            return Err(ManageError::InvalidPayload("Provide \"packages\" array."));
        }
    }

    Ok((action, updated))
}

/// Applies `request` to `current`, returning the new mappings. `add` merges
/// into the existing mappings.
pub fn edit_repo_mappings(
    current: &RepoMappings,
    request: ManageRequest,
) -> Result<(Action, RepoMappings), ManageError> {
    let action = Action::parse(&request.action)?;
    let mut updated = current.clone();

    match action {
        Action::Add => match (request.package, request.repo, request.mappings) {
            (Some(package), Some(repo), _) => updated.insert(&package, &repo),
            (_, _, Some(mappings)) => updated.merge(mappings),
            _ => {
                return Err(ManageError::InvalidPayload(
                    "Provide either \"package\" and \"repo\" or \"mappings\" object.",
                ));
            }
        },
        Action::Remove => match (request.package, request.packages) {
            (Some(package), _) => {
                updated.remove(&package);
            }
            (None, Some(packages)) => {
                for package in &packages {
                    updated.remove(package);
                }
            }
            (None, None) => {
                return Err(ManageError::InvalidPayload(
                    "Provide \"package\" or \"packages\" array.",
                ));
            }
        },
        Action::Set => match request.mappings {
            Some(mappings) => updated = mappings,
            None => return Err(ManageError::InvalidPayload("Provide \"mappings\" object.")),
        },
    }

    Ok((action, updated))
}
