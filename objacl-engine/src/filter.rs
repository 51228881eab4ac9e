//! Post-retrieval filtering of query results
//!
//! Applications run their queries unrestricted and pass the results through
//! a [`ResultFilter`] before handing them to the caller. Items the principal
//! may not see are dropped; optionally the survivors are annotated with
//! their visibility.

use objacl_api::{Entity, Permission, Principal};
use serde::Serialize;

use crate::bulk::BulkPermissionChecker;
use crate::error::Result;

/// Visibility of one result item from the caller's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SecurityAnnotation {
    pub is_public: bool,
    pub is_shared: bool,
    pub user_owned: bool,
    pub user_can_write: bool,
}

/// A result item with its annotation
///
/// `security` is `None` for anonymous callers and for items without an ACL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotated<T> {
    pub item: T,
    pub security: Option<SecurityAnnotation>,
}

pub struct ResultFilter<'a> {
    checker: BulkPermissionChecker<'a>,
}

impl<'a> ResultFilter<'a> {
    pub fn new(checker: BulkPermissionChecker<'a>) -> Self {
        Self { checker }
    }

    /// Drop items lacking `required`; `None` slots are kept as they are
    pub fn filter_by_permission<E: Entity>(
        &self,
        items: Vec<Option<E>>,
        required: &[Permission],
        principal: &Principal,
    ) -> Result<Vec<Option<E>>> {
        let present: Vec<&E> = items.iter().flatten().collect();
        if present.is_empty() {
            return Ok(items);
        }
        let mut allowed = self
            .checker
            .has_permission(&present, required, principal)?
            .into_iter();

        let before = items.len();
        let kept: Vec<Option<E>> = items
            .into_iter()
            .filter(|item| item.is_none() || allowed.next().unwrap_or(false))
            .collect();
        tracing::trace!(before, after = kept.len(), "Filtered results by permission");
        Ok(kept)
    }

    /// Drop items whose associated securable lacks `required`
    ///
    /// `associated` picks the securable governing each item; items for which
    /// it returns `None` are kept.
    pub fn filter_by_association<A, F>(
        &self,
        items: Vec<A>,
        associated: F,
        required: &[Permission],
        principal: &Principal,
    ) -> Result<Vec<A>>
    where
        F: Fn(&A) -> Option<&dyn Entity>,
    {
        let targets: Vec<Option<&dyn Entity>> = items.iter().map(&associated).collect();
        let present: Vec<&dyn Entity> = targets.iter().flatten().copied().collect();
        if present.is_empty() {
            return Ok(items);
        }
        let mut allowed = self
            .checker
            .has_permission(&present, required, principal)?
            .into_iter();
        let keep: Vec<bool> = targets
            .iter()
            .map(|target| target.is_none() || allowed.next().unwrap_or(false))
            .collect();

        Ok(items
            .into_iter()
            .zip(keep)
            .filter_map(|(item, keep)| keep.then_some(item))
            .collect())
    }

    /// The item if the principal holds `required`, otherwise `None`
    pub fn filter_quiet<E: Entity>(
        &self,
        item: E,
        required: &[Permission],
        principal: &Principal,
    ) -> Result<Option<E>> {
        let allowed = self
            .checker
            .has_permission(std::slice::from_ref(&item), required, principal)?;
        if allowed.first().copied().unwrap_or(false) {
            Ok(Some(item))
        } else {
            tracing::debug!(
                type_name = item.type_name(),
                id = ?item.id(),
                principal = principal.name(),
                "Access denied; returning nothing"
            );
            Ok(None)
        }
    }

    /// Filter by `required`, then annotate the survivors
    pub fn annotate<E: Entity>(
        &self,
        items: Vec<E>,
        required: &[Permission],
        principal: &Principal,
    ) -> Result<Vec<Annotated<E>>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let allowed = self.checker.has_permission(&items, required, principal)?;
        let visible: Vec<E> = items
            .into_iter()
            .zip(allowed)
            .filter_map(|(item, allowed)| allowed.then_some(item))
            .collect();

        let sids = self.checker.sid_resolver();
        if visible.is_empty() || sids.is_anonymous(principal) {
            return Ok(visible
                .into_iter()
                .map(|item| Annotated {
                    item,
                    security: None,
                })
                .collect());
        }

        let principal_sids = sids.resolve_sids(principal);
        let eval = self.checker.evaluator_for(&visible, Some(&principal_sids))?;
        let is_admin = sids.is_admin(principal);
        let requires_write = required.contains(&Permission::WRITE);
        let owner_sid = principal.sid();

        let mut annotated = Vec::with_capacity(visible.len());
        for item in visible {
            let security = match eval.acl_for(&item)? {
                Some(acl) => {
                    let user_owned = acl.owner() == Some(&owner_sid);
                    let user_can_write = user_owned
                        || is_admin
                        || requires_write
                        || eval.has_permission_with_sids(
                            &item,
                            &[Permission::WRITE],
                            principal,
                            &principal_sids,
                        )?;
                    Some(SecurityAnnotation {
                        is_public: !eval.is_private(&acl)?,
                        is_shared: eval.is_shared(&acl)?,
                        user_owned,
                        user_can_write,
                    })
                }
                None => None,
            };
            annotated.push(Annotated { item, security });
        }
        Ok(annotated)
    }
}
