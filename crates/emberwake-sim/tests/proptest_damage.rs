//! Property tests for the damage formula and stat aggregation.

use emberwake_sim::damage::{mitigation, DamageCalculator, DamageFlags, DamageInfo, DamageSource, DamageType};
use emberwake_sim::stats::{
    compute_stats, effective_cooldown, BaseStats, DefensiveStats, OffensiveStats, StatChannel, StatModifiers,
};
use proptest::prelude::*;

fn damage_type() -> impl Strategy<Value = DamageType> {
    prop_oneof![
        Just(DamageType::Physical),
        Just(DamageType::Arcane),
        Just(DamageType::Hybrid),
        Just(DamageType::True),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1_000))]

    #[test]
    fn mitigation_stays_in_bounds(stat in -500.0f32..1_000_000.0) {
        let r = mitigation(stat);
        prop_assert!((0.0..=0.9).contains(&r));
    }

    #[test]
    fn mitigation_is_monotonic(a in 0.0f32..10_000.0, delta in 0.0f32..10_000.0) {
        prop_assert!(mitigation(a) <= mitigation(a + delta));
    }

    #[test]
    fn final_damage_is_bounded(
        seed in any::<u64>(),
        base in -50.0f32..500.0,
        power in -1.0f32..5.0,
        crit_chance in 0.0f32..1.0,
        crit_multiplier in 1.0f32..3.0,
        armor in -100.0f32..5_000.0,
        resist in -100.0f32..5_000.0,
        damage_type in damage_type(),
        can_crit in any::<bool>(),
    ) {
        let mut calc = DamageCalculator::new(seed);
        let info = DamageInfo {
            flags: DamageFlags { can_crit, ..DamageFlags::default() },
            ..DamageInfo::new(base, damage_type, DamageSource::Environment)
        };
        let offense = OffensiveStats { power, crit_chance, crit_multiplier, cooldown_reduction: 0.0 };
        let result = calc.calculate(&info, &offense, &DefensiveStats { armor, resist });

        prop_assert!(result.final_damage >= 0.0);
        prop_assert!((0.0..=0.9).contains(&result.reduction));
        if !can_crit {
            prop_assert!(!result.is_crit);
        }
        if damage_type == DamageType::True {
            prop_assert_eq!(result.reduction, 0.0);
        }
        let ceiling = base.max(0.0) * power.max(0.0) * crit_multiplier;
        prop_assert!(result.final_damage <= ceiling + 1e-3);
    }

    #[test]
    fn same_seed_same_rolls(seed in any::<u64>()) {
        let info = DamageInfo::physical(10.0, DamageSource::Melee);
        let offense = OffensiveStats { crit_chance: 0.5, ..OffensiveStats::default() };
        let mut a = DamageCalculator::new(seed);
        let mut b = DamageCalculator::new(seed);
        for _ in 0..32 {
            prop_assert_eq!(
                a.calculate(&info, &offense, &DefensiveStats::default()),
                b.calculate(&info, &offense, &DefensiveStats::default())
            );
        }
    }

    #[test]
    fn computed_stats_are_clamped(
        crit_add in -5.0f32..5.0,
        cdr_add in -5.0f32..5.0,
        armor_add in -500.0f32..500.0,
        speed_mul in -2.0f32..3.0,
    ) {
        let mods = StatModifiers::default()
            .with_add(StatChannel::CritChance, crit_add)
            .with_add(StatChannel::CooldownReduction, cdr_add)
            .with_add(StatChannel::Armor, armor_add)
            .with_mul(StatChannel::MoveSpeed, speed_mul);
        let stats = compute_stats(&BaseStats::default(), &mods);
        prop_assert!((0.0..=1.0).contains(&stats.offense.crit_chance));
        prop_assert!((0.0..=0.8).contains(&stats.offense.cooldown_reduction));
        prop_assert!(stats.defense.armor >= 0.0);
        prop_assert!(stats.move_speed >= 0.0);
        prop_assert!(!stats.is_dirty);
    }

    #[test]
    fn cooldown_never_below_floor(base in 0.0f32..30.0, reduction in -2.0f32..5.0) {
        let cd = effective_cooldown(base, reduction);
        prop_assert!(cd >= 0.1);
        prop_assert!(cd >= base * 0.2 - 1e-4);
    }
}
