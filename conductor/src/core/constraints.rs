//! Role/artifact authorization matrix.
//!
//! Every artifact mutation a mode controller performs is checked here first.
//! Checks are pure: the same request always yields the same decision.

use std::path::Path;

use crate::core::types::{ArtifactClass, FeatureStatus, Mode, MutationKind};

/// Mutations a mode may perform on one artifact class.
#[derive(Debug, Clone, Copy)]
pub struct Grant {
    pub class: ArtifactClass,
    pub kinds: &'static [MutationKind],
}

const SPEC_CREATE: &[MutationKind] = &[MutationKind::Create, MutationKind::Annotate];
const AUTHORING: &[MutationKind] = &[MutationKind::Create, MutationKind::Modify];
const RESTRUCTURE: &[MutationKind] = &[
    MutationKind::Create,
    MutationKind::Modify,
    MutationKind::Delete,
];

/// The fixed role/artifact matrix. Modes are disjoint in the classes they touch,
/// except refactor (which reshapes business logic) and step optimization
/// (which reorganizes step definitions).
pub const MATRIX: &[(Mode, &[Grant])] = &[
    (Mode::Idle, &[]),
    (
        Mode::Requirements,
        &[Grant {
            class: ArtifactClass::SpecificationDocument,
            kinds: SPEC_CREATE,
        }],
    ),
    (
        Mode::Steps,
        &[
            Grant {
                class: ArtifactClass::StepDefinition,
                kinds: AUTHORING,
            },
            Grant {
                class: ArtifactClass::PageObject,
                kinds: AUTHORING,
            },
            Grant {
                class: ArtifactClass::Helper,
                kinds: AUTHORING,
            },
        ],
    ),
    (
        Mode::Implement,
        &[Grant {
            class: ArtifactClass::BusinessLogic,
            kinds: AUTHORING,
        }],
    ),
    (
        Mode::Refactor,
        &[Grant {
            class: ArtifactClass::BusinessLogic,
            kinds: RESTRUCTURE,
        }],
    ),
    (
        Mode::StepOptimize,
        &[Grant {
            class: ArtifactClass::StepDefinition,
            kinds: RESTRUCTURE,
        }],
    ),
];

/// Decision for a single mutation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Allow,
    Deny(String),
}

impl Authorization {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Authorization::Allow)
    }
}

/// Grants held by `mode`.
pub fn grants(mode: Mode) -> &'static [Grant] {
    MATRIX
        .iter()
        .find(|(owner, _)| *owner == mode)
        .map(|(_, grants)| *grants)
        .unwrap_or(&[])
}

/// Artifact classes `mode` may touch at all.
pub fn allowed_classes(mode: Mode) -> Vec<ArtifactClass> {
    grants(mode).iter().map(|grant| grant.class).collect()
}

/// Pure matrix lookup: may `mode` perform `kind` on `class`?
pub fn authorize(mode: Mode, class: ArtifactClass, kind: MutationKind) -> Authorization {
    let granted = grants(mode)
        .iter()
        .any(|grant| grant.class == class && grant.kinds.contains(&kind));
    if granted {
        Authorization::Allow
    } else {
        Authorization::Deny(format!("{mode} may not {} {class} artifacts", kind.as_str()))
    }
}

/// A fully described mutation request.
#[derive(Debug, Clone, Copy)]
pub struct MutationRequest<'a> {
    pub mode: Mode,
    pub path: &'a Path,
    pub class: ArtifactClass,
    pub kind: MutationKind,
    /// Status of the feature owning the artifact, if any.
    pub feature_status: Option<FeatureStatus>,
    /// Explicit human-confirmed override for specification content.
    pub human_override: bool,
}

/// Matrix lookup plus the specification-body rule.
///
/// Once a feature is past `draft`, its specification body may only change under
/// a human-confirmed override in requirements mode. Annotations are exempt.
pub fn authorize_mutation(request: &MutationRequest<'_>) -> Authorization {
    let path = request.path.display();
    if request.class == ArtifactClass::Unclassified {
        return Authorization::Deny(format!("{path}: outside every artifact class"));
    }

    let body_edit = request.class == ArtifactClass::SpecificationDocument
        && matches!(request.kind, MutationKind::Modify | MutationKind::Delete);
    if body_edit {
        let overridden = request.human_override && request.mode == Mode::Requirements;
        if overridden {
            return Authorization::Allow;
        }
        if let Some(status) = request.feature_status
            && status != FeatureStatus::Draft
        {
            return Authorization::Deny(format!(
                "{path}: specification is '{status}'; its requirements may not change without a human override"
            ));
        }
    }

    match authorize(request.mode, request.class, request.kind) {
        Authorization::Allow => Authorization::Allow,
        Authorization::Deny(reason) => Authorization::Deny(format!("{path}: {reason}")),
    }
}

/// Check a whole batch before any write. Returns every denial (empty = allowed).
pub fn check_mutations(requests: &[MutationRequest<'_>]) -> Vec<String> {
    requests
        .iter()
        .filter_map(|request| match authorize_mutation(request) {
            Authorization::Allow => None,
            Authorization::Deny(reason) => Some(reason),
        })
        .collect()
}
