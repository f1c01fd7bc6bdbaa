//! Skill tree model
//!
//! The node graph the editor draws: each bonus lists the bonuses it depends
//! on and the ones it unlocks, plus its canvas position.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// One node of the skill tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bonus {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Ids of the bonuses this one depends on
    pub dependencies: Vec<String>,
    /// Ids of the bonuses this one unlocks
    pub unlocks: Vec<String>,
    pub x: f64,
    pub y: f64,
}

/// Kind of a tree edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    DependsOn,
    Unlocks,
}

/// Directed edge between two bonuses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub kind: EdgeKind,
}

/// The skill tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusTree {
    bonuses: Vec<Bonus>,
}

impl Default for BonusTree {
    fn default() -> Self {
        Self::new(default_bonuses())
    }
}

impl BonusTree {
    pub fn new(bonuses: Vec<Bonus>) -> Self {
        Self { bonuses }
    }

    pub fn bonuses(&self) -> &[Bonus] {
        &self.bonuses
    }

    pub fn get(&self, id: &str) -> Option<&Bonus> {
        self.bonuses.iter().find(|b| b.id == id)
    }

    /// Move a node; unknown ids are ignored
    pub fn update_position(&mut self, id: &str, x: f64, y: f64) -> bool {
        match self.bonuses.iter_mut().find(|b| b.id == id) {
            Some(bonus) => {
                bonus.x = x;
                bonus.y = y;
                debug!("Moved bonus '{}' to ({}, {})", id, x, y);
                true
            }
            None => false,
        }
    }

    /// Every dependency and unlock edge, in node order
    pub fn edges(&self) -> Vec<Edge<'_>> {
        self.bonuses
            .iter()
            .flat_map(|bonus| {
                let deps = bonus.dependencies.iter().map(move |dep| Edge {
                    from: bonus.id.as_str(),
                    to: dep.as_str(),
                    kind: EdgeKind::DependsOn,
                });
                let unlocks = bonus.unlocks.iter().map(move |next| Edge {
                    from: bonus.id.as_str(),
                    to: next.as_str(),
                    kind: EdgeKind::Unlocks,
                });
                deps.chain(unlocks)
            })
            .collect()
    }

    /// Edges pointing at ids that are not in the tree
    pub fn dangling_edges(&self) -> Vec<Edge<'_>> {
        self.edges()
            .into_iter()
            .filter(|edge| self.get(edge.to).is_none())
            .collect()
    }
}

fn bonus(
    id: &str,
    name: &str,
    description: &str,
    dependencies: &[&str],
    unlocks: &[&str],
    x: f64,
    y: f64,
) -> Bonus {
    Bonus {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        dependencies: dependencies.iter().map(|s| s.to_string()).collect(),
        unlocks: unlocks.iter().map(|s| s.to_string()).collect(),
        x,
        y,
    }
}

/// The tree the editor starts with
pub fn default_bonuses() -> Vec<Bonus> {
    vec![
        bonus(
            "strength-boost-1",
            "Strength Boost I",
            "+10 Base Attack",
            &[],
            &["strength-boost-2", "power-strike"],
            50.0,
            150.0,
        ),
        bonus(
            "strength-boost-2",
            "Strength Boost II",
            "+20 Base Attack",
            &["strength-boost-1"],
            &["heavy-strike"],
            300.0,
            80.0,
        ),
        bonus(
            "power-strike",
            "Power Strike",
            "Unlocks \"Power Strike\" ability: deals 200% weapon damage.",
            &["strength-boost-1"],
            &["critical-power-strike"],
            300.0,
            220.0,
        ),
        bonus(
            "magic-bolt-1",
            "Magic Bolt I",
            "Unlocks \"Magic Bolt\" spell: deals 50 magic damage.",
            &[],
            &["magic-bolt-2", "arcane-shield", "spell-penetration-1"],
            50.0,
            400.0,
        ),
        bonus(
            "magic-bolt-2",
            "Magic Bolt II",
            "+30% Damage for Magic Bolt",
            &["magic-bolt-1"],
            &["elemental-overload", "chain-lightning"],
            300.0,
            330.0,
        ),
        bonus(
            "arcane-shield",
            "Arcane Shield",
            "Grants a shield that absorbs 100 damage. Cooldown: 30s.",
            &["magic-bolt-1"],
            &["improved-arcane-shield"],
            300.0,
            470.0,
        ),
        bonus(
            "swiftness-aura",
            "Swiftness Aura",
            "+15% Movement Speed",
            &[],
            &["evasion-boost"],
            50.0,
            600.0,
        ),
        bonus(
            "critical-power-strike",
            "Critical Power Strike",
            "\"Power Strike\" now has a 25% chance to be a critical hit (300% damage).",
            &["power-strike"],
            &["elemental-overload", "berserk-mode"],
            550.0,
            220.0,
        ),
        bonus(
            "elemental-overload",
            "Elemental Overload",
            "Spells and critical strikes deal an additional 15% of their damage as elemental damage over 3 seconds.",
            &["magic-bolt-2", "critical-power-strike"],
            &["master-of-elements"],
            750.0,
            300.0,
        ),
        bonus(
            "heavy-strike",
            "Heavy Strike",
            "A powerful blow that stuns for 1s. Requires Strength Boost II.",
            &["strength-boost-2"],
            &["berserk-mode"],
            550.0,
            80.0,
        ),
        bonus(
            "spell-penetration-1",
            "Spell Penetration I",
            "Magic attacks ignore 10% of enemy resistance.",
            &["magic-bolt-1"],
            &["spell-penetration-2"],
            300.0,
            580.0,
        ),
        bonus(
            "improved-arcane-shield",
            "Improved Arcane Shield",
            "Arcane Shield absorbs 50 more damage and cooldown reduced by 5s.",
            &["arcane-shield"],
            &["master-of-elements"],
            550.0,
            470.0,
        ),
        bonus(
            "evasion-boost",
            "Evasion Boost",
            "+10% chance to dodge attacks.",
            &["swiftness-aura"],
            &[],
            300.0,
            680.0,
        ),
        bonus(
            "chain-lightning",
            "Chain Lightning",
            "Magic Bolt II can now chain to 2 additional targets for 50% damage.",
            &["magic-bolt-2"],
            &["master-of-elements"],
            550.0,
            380.0,
        ),
        bonus(
            "berserk-mode",
            "Berserk Mode",
            "For 10s, +25% attack speed and +10% damage, but -15% defense. Requires Heavy Strike & Crit. Power Strike.",
            &["heavy-strike", "critical-power-strike"],
            &[],
            750.0,
            150.0,
        ),
        bonus(
            "spell-penetration-2",
            "Spell Penetration II",
            "Magic attacks ignore an additional 15% of enemy resistance.",
            &["spell-penetration-1"],
            &["master-of-elements"],
            550.0,
            580.0,
        ),
        bonus(
            "master-of-elements",
            "Master of Elements",
            "Ultimate: All elemental effects are 25% stronger and last 50% longer.",
            &[
                "elemental-overload",
                "improved-arcane-shield",
                "chain-lightning",
                "spell-penetration-2",
            ],
            &[],
            950.0,
            400.0,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_tree_is_consistent() {
        let tree = BonusTree::default();
        assert_eq!(tree.bonuses().len(), 17);

        let ids: HashSet<_> = tree.bonuses().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids.len(), 17);
        assert!(tree.dangling_edges().is_empty());

        // Every unlock is mirrored by a dependency
        for edge in tree.edges().iter().filter(|e| e.kind == EdgeKind::Unlocks) {
            let target = tree.get(edge.to).unwrap();
            assert!(
                target.dependencies.iter().any(|d| d == edge.from),
                "{} unlocks {} without a matching dependency",
                edge.from,
                edge.to
            );
        }
    }

    #[test]
    fn test_get() {
        let tree = BonusTree::default();
        assert_eq!(tree.get("power-strike").unwrap().name, "Power Strike");
        assert!(tree.get("missing").is_none());
    }

    #[test]
    fn test_update_position() {
        let mut tree = BonusTree::default();
        assert!(tree.update_position("evasion-boost", 10.0, 20.5));
        let bonus = tree.get("evasion-boost").unwrap();
        assert_eq!((bonus.x, bonus.y), (10.0, 20.5));

        let before = tree.clone();
        assert!(!tree.update_position("missing", 1.0, 1.0));
        assert_eq!(tree, before);
    }

    #[test]
    fn test_dangling_edges_reported() {
        let tree = BonusTree::new(vec![bonus("a", "A", "", &["ghost"], &[], 0.0, 0.0)]);
        let dangling = tree.dangling_edges();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].to, "ghost");
        assert_eq!(dangling[0].kind, EdgeKind::DependsOn);
    }
}
