/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pure decision logic of the three-chain protocol: whether a replica may vote for a proposal, and
//! how its [`QcWindow`] slides once it does.
//!
//! Nothing in this module performs I/O or takes locks. The [`Smr`](crate::smr::Smr) resolves a
//! proposal's ancestry through [`ExternalConsensus`](crate::external::ExternalConsensus) first, and
//! then calls these functions with the lock held.

use crate::{
    smr::{SafetyViolation, SmrError},
    types::{
        certificates::{QcWindow, QuorumCert},
        data_types::ViewNumber,
    },
};

/// A proposal certificate together with what the ledger says about its ancestors.
pub(crate) struct Ancestry<'a> {
    pub(crate) props_qc: &'a QuorumCert,
    /// Whether `props_qc` certifies the first proposal of the chain.
    pub(crate) is_first: bool,
    /// The certificate that justifies `props_qc`. `None` iff `is_first`.
    pub(crate) prev_qc: Option<&'a QuorumCert>,
    /// Whether `prev_qc` carries a valid quorum of signatures.
    pub(crate) prev_certified: bool,
    /// The certificate that justifies `prev_qc`, if it could be resolved.
    pub(crate) prev_prev_qc: Option<&'a QuorumCert>,
}

/// Decide whether it is safe to vote for `ancestry.props_qc`, given the replica's `window` and
/// `voted_view`.
///
/// # Rules
///
/// 1. The proposal's view must not be lower than `voted_view`, and must be higher than the view of
///    the current `generate_qc`.
/// 2. The replica must not already hold a different proposal for the same or a higher view.
/// 3. Unless it is the first proposal, the proposal must be justified by a certified `prev_qc` with
///    a lower view.
/// 4. If the replica is locked, `prev_qc` must either be newer than the lock, or extend it (i.e.,
///    `prev_qc` or `prev_prev_qc` is the locked certificate).
pub(crate) fn safe_proposal(
    window: &QcWindow,
    voted_view: ViewNumber,
    ancestry: &Ancestry,
) -> Result<(), SmrError> {
    let props_qc = ancestry.props_qc;

    if props_qc.view_number < voted_view
        || (window.generate_qc.is_some() && props_qc.view_number <= window.generate_view())
    {
        return Err(SmrError::PropsViewNum {
            view_number: props_qc.view_number,
            qc_view: props_qc.view_number,
            voted_view,
        });
    }

    if let Some(proposal_qc) = &window.proposal_qc {
        if !proposal_qc.is_same_proposal(props_qc)
            && props_qc.view_number <= proposal_qc.view_number
        {
            return Err(SmrError::SafeProposal(SafetyViolation::Equivocation));
        }
    }

    if ancestry.is_first {
        return Ok(());
    }

    let prev_qc = ancestry
        .prev_qc
        .ok_or(SmrError::SafeProposal(SafetyViolation::MissingAncestor))?;

    if prev_qc.view_number >= props_qc.view_number {
        return Err(SmrError::SafeProposal(SafetyViolation::ViewOrder));
    }

    if !ancestry.prev_certified {
        return Err(SmrError::SafeProposal(SafetyViolation::UncertifiedAncestor));
    }

    match &window.locked_qc {
        None => Ok(()),
        Some(locked_qc) => {
            let extends_lock = prev_qc.is_same_proposal(locked_qc)
                || ancestry
                    .prev_prev_qc
                    .is_some_and(|prev_prev_qc| prev_prev_qc.is_same_proposal(locked_qc));
            if prev_qc.view_number > locked_qc.view_number || extends_lock {
                Ok(())
            } else {
                Err(SmrError::SafeProposal(SafetyViolation::NotExtendingLock))
            }
        }
    }
}

/// Compute the window a replica moves to after voting for `ancestry.props_qc`.
///
/// - If `prev_qc` is the replica's own `generate_qc` (the replica led the previous view), only the
///   proposal slot changes.
/// - If `props_qc` is the first proposal, the window restarts with it alone.
/// - Otherwise the window slides by a full step to `(props_qc, prev_qc, prev_prev_qc)`. If
///   `prev_prev_qc` could not be resolved, `prev_prev_error` is returned instead.
///
/// The resulting window must be [ordered](QcWindow::is_ordered).
pub(crate) fn next_window_on_proposal(
    window: &QcWindow,
    ancestry: &Ancestry,
    prev_prev_error: Option<SmrError>,
) -> Result<QcWindow, SmrError> {
    let props_qc = ancestry.props_qc.clone();

    let next = match (ancestry.prev_qc, &window.generate_qc) {
        (Some(prev_qc), Some(generate_qc)) if prev_qc.is_same_proposal(generate_qc) => {
            QcWindow::new(
                Some(props_qc),
                Some(generate_qc.clone()),
                window.locked_qc.clone(),
            )
        }
        _ if ancestry.is_first => QcWindow::new(Some(props_qc), None, None),
        _ => {
            if let Some(err) = prev_prev_error {
                return Err(err);
            }
            QcWindow::new(
                Some(props_qc),
                ancestry.prev_qc.cloned(),
                ancestry.prev_prev_qc.cloned(),
            )
        }
    };

    check_window_order(&next)?;
    Ok(next)
}

/// Reject a window whose views do not strictly increase from `locked_qc` to `proposal_qc`.
pub(crate) fn check_window_order(window: &QcWindow) -> Result<(), SmrError> {
    if window.is_ordered() {
        Ok(())
    } else {
        Err(SmrError::SafeProposal(SafetyViolation::ViewOrder))
    }
}
