// Stage Registry - compiled-in stage tables per lifecycle type
//
// Every lifecycle is a linear path: advancing means order + 1, moving back
// means order - 1. The last entry of each table is the terminal stage.

use serde::Serialize;

use crate::auth::catalog::roles;
use crate::domain::LifecycleType;

/// Registry definition of one stage in a lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDefinition {
    pub name: &'static str,
    pub order: u32,
    pub required_role: Option<&'static str>,
    pub description: &'static str,
}

const fn stage(
    name: &'static str,
    order: u32,
    required_role: Option<&'static str>,
    description: &'static str,
) -> StageDefinition {
    StageDefinition {
        name,
        order,
        required_role,
        description,
    }
}

static NEW_ITEM_STAGES: [StageDefinition; 8] = [
    stage("Draft", 1, Some(roles::CATEGORY_MANAGER), "Category manager prepares the item request"),
    stage("Freight Strategy", 2, Some(roles::LOGISTICS), "Logistics defines inbound freight terms"),
    stage("Supplier Pricing", 3, Some(roles::SUPPLIER), "Supplier submits cost and pack details"),
    stage("KINEXO Pricing", 4, Some(roles::PRICING_SPECIALIST), "Pricing specialist sets sell pricing"),
    stage("CM Approval", 5, Some(roles::CATEGORY_MANAGER), "Category manager approves the item"),
    stage("SSM Approval", 6, Some(roles::STRATEGIC_SUPPLY_MANAGER), "Strategic supply manager signs off"),
    stage("In Transition", 7, Some(roles::DC_OPERATOR), "Distribution centre sets the item up"),
    stage("Completed", 8, None, "Item is live"),
];

static TRANSITIONING_ITEM_STAGES: [StageDefinition; 9] = [
    stage("Draft", 1, Some(roles::CATEGORY_MANAGER), "Category manager prepares the transition request"),
    stage("Item Comparison", 2, Some(roles::CATEGORY_MANAGER), "Outgoing and incoming items are compared"),
    stage("Freight Strategy", 3, Some(roles::LOGISTICS), "Logistics defines inbound freight terms"),
    stage("Supplier Pricing", 4, Some(roles::SUPPLIER), "Supplier submits cost and pack details"),
    stage("KINEXO Pricing", 5, Some(roles::PRICING_SPECIALIST), "Pricing specialist sets sell pricing"),
    stage("CM Approval", 6, Some(roles::CATEGORY_MANAGER), "Category manager approves the transition"),
    stage("SSM Approval", 7, Some(roles::STRATEGIC_SUPPLY_MANAGER), "Strategic supply manager signs off"),
    stage("DC Transition", 8, Some(roles::DC_OPERATOR), "Distribution centre swaps stock over"),
    stage("Completed", 9, None, "Transition is finished"),
];

static DELETING_ITEM_STAGES: [StageDefinition; 6] = [
    stage("Draft", 1, Some(roles::CATEGORY_MANAGER), "Category manager proposes the deletion"),
    stage("Impact Analysis", 2, Some(roles::CATEGORY_MANAGER), "Downstream impact of removal is assessed"),
    stage("SSM Review", 3, Some(roles::STRATEGIC_SUPPLY_MANAGER), "Strategic supply manager reviews the deletion"),
    stage("DC Runout", 4, Some(roles::DC_OPERATOR), "Distribution centre sells through remaining stock"),
    stage("Archive", 5, Some(roles::ADMIN), "Item record is archived"),
    stage("Completed", 6, None, "Item is deleted"),
];

/// Ordered stage table for a lifecycle type
pub fn stages_for(lifecycle: LifecycleType) -> &'static [StageDefinition] {
    match lifecycle {
        LifecycleType::NewItem => &NEW_ITEM_STAGES,
        LifecycleType::TransitioningItem => &TRANSITIONING_ITEM_STAGES,
        LifecycleType::DeletingItem => &DELETING_ITEM_STAGES,
    }
}

/// Stage table for a raw lifecycle name; unknown names get the NEW_ITEM table.
pub fn stages_for_name(name: &str) -> &'static [StageDefinition] {
    stages_for(LifecycleType::resolve(name, false).unwrap_or(LifecycleType::NewItem))
}

pub fn stage_count(lifecycle: LifecycleType) -> u32 {
    stages_for(lifecycle).len() as u32
}

/// Stage at a 1-based position, if any
pub fn stage_at(lifecycle: LifecycleType, order: u32) -> Option<&'static StageDefinition> {
    if order == 0 {
        return None;
    }
    stages_for(lifecycle).get(order as usize - 1)
}

pub fn first_stage(lifecycle: LifecycleType) -> &'static StageDefinition {
    &stages_for(lifecycle)[0]
}

pub fn terminal_stage(lifecycle: LifecycleType) -> &'static StageDefinition {
    let stages = stages_for(lifecycle);
    &stages[stages.len() - 1]
}

pub fn is_terminal(lifecycle: LifecycleType, order: u32) -> bool {
    order == stage_count(lifecycle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_tables_have_expected_lengths() {
        assert_eq!(stage_count(LifecycleType::NewItem), 8);
        assert_eq!(stage_count(LifecycleType::TransitioningItem), 9);
        assert_eq!(stage_count(LifecycleType::DeletingItem), 6);
    }

    #[test]
    fn test_orders_are_contiguous_from_one() {
        for lifecycle in LifecycleType::ALL {
            for (index, stage) in stages_for(lifecycle).iter().enumerate() {
                assert_eq!(stage.order as usize, index + 1, "{lifecycle} {}", stage.name);
            }
        }
    }

    #[test]
    fn test_only_terminal_stage_has_no_owner() {
        for lifecycle in LifecycleType::ALL {
            let stages = stages_for(lifecycle);
            let (last, rest) = stages.split_last().unwrap();
            assert_eq!(last.name, "Completed");
            assert!(last.required_role.is_none());
            assert!(rest.iter().all(|s| s.required_role.is_some()));
        }
    }

    #[test]
    fn test_transitioning_item_differs_from_new_item() {
        let names: Vec<&str> = stages_for(LifecycleType::TransitioningItem)
            .iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names[1], "Item Comparison");
        assert!(names.contains(&"DC Transition"));
        assert!(!names.contains(&"In Transition"));
    }

    #[test]
    fn test_deleting_item_archive_is_admin_owned() {
        let archive = stage_at(LifecycleType::DeletingItem, 5).unwrap();
        assert_eq!(archive.name, "Archive");
        assert_eq!(archive.required_role, Some(roles::ADMIN));
    }

    #[test]
    fn test_stage_lookup_bounds() {
        assert!(stage_at(LifecycleType::NewItem, 0).is_none());
        assert!(stage_at(LifecycleType::NewItem, 9).is_none());
        assert_eq!(first_stage(LifecycleType::DeletingItem).name, "Draft");
        assert_eq!(terminal_stage(LifecycleType::NewItem).order, 8);
        assert!(is_terminal(LifecycleType::DeletingItem, 6));
        assert!(!is_terminal(LifecycleType::DeletingItem, 5));
    }

    #[test]
    fn test_unknown_name_falls_back_to_new_item() {
        assert_eq!(stages_for_name("SOMETHING_ELSE").len(), 8);
        assert_eq!(stages_for_name("DELETING_ITEM").len(), 6);
    }
}
