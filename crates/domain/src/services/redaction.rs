//! Member field redaction driven by group settings.

use crate::models::{GroupMembership, GroupSettings};

/// Projects a membership for a viewer.
///
/// Admin viewers get the record unchanged. Everyone else loses `name`,
/// `net_id` and `email` unless the group settings allow them, and always loses
/// `external_id`. Memberships carry no phone number, so
/// `can_view_member_phone` has nothing to gate here.
pub fn redact(
    membership: &GroupMembership,
    settings: Option<&GroupSettings>,
    viewer_is_admin: bool,
) -> GroupMembership {
    let mut view = membership.clone();
    if viewer_is_admin {
        return view;
    }

    let prefs = settings.copied().unwrap_or_default().member_info_preferences;
    if !prefs.can_view_member_name {
        view.name = None;
    }
    if !prefs.can_view_member_net_id {
        view.net_id = None;
    }
    if !prefs.can_view_member_email {
        view.email = None;
    }
    view.external_id = None;
    view
}
