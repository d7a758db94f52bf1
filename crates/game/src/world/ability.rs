use serde::{Deserialize, Serialize};

pub type AbilityId = u8;
pub type HeroClass = u8;

pub const ABILITY_SLOTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Recharge {
    /// Needs a full bar; casting empties it.
    Cooldown { ticks: u32 },
    /// Casting spends `cost` of the bar, so several casts can be stored.
    Charge { ticks: u32, cost: f32 },
}

impl Recharge {
    pub fn per_tick(&self) -> f32 {
        let ticks = match self {
            Recharge::Cooldown { ticks } | Recharge::Charge { ticks, .. } => *ticks,
        };
        if ticks == 0 { 1.0 } else { 1.0 / ticks as f32 }
    }

    pub fn cost(&self) -> f32 {
        match self {
            Recharge::Cooldown { .. } => 1.0,
            Recharge::Charge { cost, .. } => *cost,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectileDef {
    /// World units per tick.
    pub speed: f32,
    pub radius: f32,
    pub damage: u16,
    pub lifetime_ticks: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AbilityEffect {
    Projectile(ProjectileDef),
    /// Moves the caster along its aim, stopping short of anything solid.
    Dash { distance: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityDef {
    pub id: AbilityId,
    pub name: String,
    pub recharge: Recharge,
    pub effect: AbilityEffect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeroClassDef {
    pub class: HeroClass,
    pub name: String,
    pub abilities: [AbilityId; ABILITY_SLOTS],
    /// World units per tick.
    pub speed: f32,
    pub radius: f32,
    pub max_health: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitDef {
    pub speed: f32,
    pub radius: f32,
    pub max_health: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrateDef {
    pub half_size: f32,
    pub max_health: u16,
}

/// Gameplay tables shared by the server simulation and client prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityRegistry {
    abilities: Vec<AbilityDef>,
    classes: Vec<HeroClassDef>,
    pub unit: UnitDef,
    pub crate_def: CrateDef,
    pub respawn_ticks: u32,
}

impl AbilityRegistry {
    pub fn new(
        abilities: Vec<AbilityDef>,
        classes: Vec<HeroClassDef>,
        unit: UnitDef,
        crate_def: CrateDef,
        respawn_ticks: u32,
    ) -> Self {
        Self {
            abilities,
            classes,
            unit,
            crate_def,
            respawn_ticks,
        }
    }

    pub fn standard() -> Self {
        let bolt = ProjectileDef {
            speed: 12.0,
            radius: 4.0,
            damage: 12,
            lifetime_ticks: 30,
        };
        let abilities = vec![
            AbilityDef {
                id: 0,
                name: "Bolt".into(),
                recharge: Recharge::Cooldown { ticks: 15 },
                effect: AbilityEffect::Projectile(bolt),
            },
            AbilityDef {
                id: 1,
                name: "Volley".into(),
                recharge: Recharge::Charge {
                    ticks: 180,
                    cost: 1.0 / 3.0,
                },
                effect: AbilityEffect::Projectile(ProjectileDef {
                    speed: 9.0,
                    radius: 6.0,
                    damage: 20,
                    lifetime_ticks: 40,
                }),
            },
            AbilityDef {
                id: 2,
                name: "Dash".into(),
                recharge: Recharge::Cooldown { ticks: 120 },
                effect: AbilityEffect::Dash { distance: 80.0 },
            },
            AbilityDef {
                id: 3,
                name: "Lance".into(),
                recharge: Recharge::Cooldown { ticks: 300 },
                effect: AbilityEffect::Projectile(ProjectileDef {
                    speed: 18.0,
                    radius: 10.0,
                    damage: 60,
                    lifetime_ticks: 45,
                }),
            },
            AbilityDef {
                id: 4,
                name: "Slam".into(),
                recharge: Recharge::Cooldown { ticks: 90 },
                effect: AbilityEffect::Projectile(ProjectileDef {
                    speed: 4.0,
                    radius: 24.0,
                    damage: 35,
                    lifetime_ticks: 6,
                }),
            },
        ];

        let classes = vec![
            HeroClassDef {
                class: 0,
                name: "Ranger".into(),
                abilities: [0, 1, 2, 3],
                speed: 4.0,
                radius: 14.0,
                max_health: 100,
            },
            HeroClassDef {
                class: 1,
                name: "Warden".into(),
                abilities: [4, 0, 2, 3],
                speed: 3.0,
                radius: 18.0,
                max_health: 160,
            },
        ];

        Self::new(
            abilities,
            classes,
            UnitDef {
                speed: 1.5,
                radius: 10.0,
                max_health: 40,
            },
            CrateDef {
                half_size: 16.0,
                max_health: 80,
            },
            90,
        )
    }

    pub fn ability(&self, id: AbilityId) -> Option<&AbilityDef> {
        self.abilities.iter().find(|a| a.id == id)
    }

    pub fn class(&self, class: HeroClass) -> Option<&HeroClassDef> {
        self.classes.iter().find(|c| c.class == class)
    }

    pub fn classes(&self) -> &[HeroClassDef] {
        &self.classes
    }

    /// The ability in `slot` for heroes of `class`.
    pub fn slot_ability(&self, class: HeroClass, slot: usize) -> Option<&AbilityDef> {
        let id = *self.class(class)?.abilities.get(slot)?;
        self.ability(id)
    }
}

impl Default for AbilityRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_classes_reference_known_abilities() {
        let registry = AbilityRegistry::standard();
        for class in registry.classes() {
            for slot in 0..ABILITY_SLOTS {
                assert!(registry.slot_ability(class.class, slot).is_some());
            }
        }
        assert!(registry.class(7).is_none());
    }

    #[test]
    fn charge_costs_fraction() {
        let recharge = Recharge::Charge {
            ticks: 100,
            cost: 0.25,
        };
        assert_eq!(recharge.cost(), 0.25);
        assert_eq!(recharge.per_tick(), 0.01);
        assert_eq!(Recharge::Cooldown { ticks: 0 }.per_tick(), 1.0);
    }
}
