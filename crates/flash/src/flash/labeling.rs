//! Assigns vapor, liquid and aqueous tags to solved phases.

use crate::{
    eos::{EosPhase, RootSelection, pseudo_critical_temperature},
    registry::Species,
};

use super::PhaseKind;

/// Water mole fraction above which a liquid-like phase is aqueous.
const AQUEOUS_WATER: f64 = 0.5;

const KINDS: [PhaseKind; 3] = [PhaseKind::Vapor, PhaseKind::Liquid, PhaseKind::Aqueous];

/// Returns one distinct kind per phase, in the order of `phases`.
///
/// Phases are ranked by molar volume, and the assignment keeps that ranking:
/// a lighter phase never gets a heavier tag than a denser one. Among such
/// assignments, the one closest to each phase's own preference wins. Two
/// liquid-like phases therefore become liquid and aqueous, never vapor and
/// liquid.
pub(super) fn assign(
    phases: &[EosPhase],
    species: &[Species],
    water: Option<usize>,
    temperature: f64,
) -> Vec<PhaseKind> {
    let mut order: Vec<usize> = (0..phases.len()).collect();
    order.sort_by(|&a, &b| {
        phases[b]
            .translated_volume
            .total_cmp(&phases[a].translated_volume)
    });

    let preferred: Vec<usize> = order
        .iter()
        .map(|&p| rank(preferred_kind(&phases[p], species, water, temperature)))
        .collect();

    // Ranked by total distance, then by the per-phase distances lightest
    // first, so a tie keeps the lightest phase on its own preference.
    let mut best: Option<((usize, Vec<usize>), Vec<usize>)> = None;
    for slots in increasing_slots(phases.len()) {
        let misses: Vec<usize> = slots
            .iter()
            .zip(&preferred)
            .map(|(s, p)| s.abs_diff(*p))
            .collect();
        let key = (misses.iter().sum::<usize>(), misses);
        if best.as_ref().is_none_or(|(kept, _)| key < *kept) {
            best = Some((key, slots));
        }
    }

    let mut kinds = vec![PhaseKind::Vapor; phases.len()];
    if let Some((_, slots)) = best {
        for (&phase, slot) in order.iter().zip(slots) {
            kinds[phase] = KINDS[slot];
        }
    }
    kinds
}

/// The kind a phase would take on its own.
///
/// With three real roots, the selected branch decides between vapor and
/// liquid. Otherwise the phase is vapor-like when `T` is at or above the Li
/// pseudo-critical temperature `Σ φ_i Tc_i`, `φ_i = x_i Vc_i / Σ x_j Vc_j`.
pub(super) fn preferred_kind(
    phase: &EosPhase,
    species: &[Species],
    water: Option<usize>,
    temperature: f64,
) -> PhaseKind {
    let vapor_like = if phase.roots.len() >= 3 {
        phase.root == RootSelection::Vapor
    } else {
        let critical = species
            .iter()
            .map(|s| (s.critical_temperature, s.critical_volume));
        temperature >= pseudo_critical_temperature(&phase.composition, critical)
    };

    if vapor_like {
        PhaseKind::Vapor
    } else if water.is_some_and(|w| phase.composition[w] >= AQUEOUS_WATER) {
        PhaseKind::Aqueous
    } else {
        PhaseKind::Liquid
    }
}

fn rank(kind: PhaseKind) -> usize {
    match kind {
        PhaseKind::Vapor => 0,
        PhaseKind::Liquid => 1,
        PhaseKind::Aqueous => 2,
    }
}

/// Every strictly increasing choice of `count` slots out of `0..3`, in
/// lexicographic order.
fn increasing_slots(count: usize) -> Vec<Vec<usize>> {
    match count {
        0 => vec![Vec::new()],
        1 => (0..3).map(|a| vec![a]).collect(),
        2 => vec![vec![0, 1], vec![0, 2], vec![1, 2]],
        _ => vec![vec![0, 1, 2]],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        config::FlashConfig, eos::CubicEos, mixture::Mixture, registry::Database,
    };

    fn setup(feed: &[(&str, f64)]) -> (Mixture, CubicEos) {
        let mixture = Mixture::new(&Database::builtin().unwrap(), feed).unwrap();
        let eos = CubicEos::new(&mixture, &FlashConfig::default());
        (mixture, eos)
    }

    #[test]
    fn subcritical_vapor_root_is_vapor() {
        let (mixture, eos) = setup(&[("propane", 1.0)]);
        let phase = eos
            .evaluate(&[1.0], 300.0, 5e5, RootSelection::MinimumGibbs)
            .unwrap();
        let kinds = assign(&[phase], mixture.components(), None, 300.0);
        assert_eq!(kinds, vec![PhaseKind::Vapor]);
    }

    #[test]
    fn water_rich_liquid_is_aqueous() {
        let (mixture, eos) = setup(&[("water", 0.5), ("methane", 0.5)]);
        let state = eos.state_point(300.0, 1e6).unwrap();
        let water = state.evaluate(&[0.999, 0.001], RootSelection::Liquid).unwrap();
        let gas = state.evaluate(&[0.01, 0.99], RootSelection::Vapor).unwrap();

        let kinds = assign(
            &[water, gas],
            mixture.components(),
            mixture.water_index(),
            300.0,
        );
        assert_eq!(kinds, vec![PhaseKind::Aqueous, PhaseKind::Vapor]);
    }

    #[test]
    fn two_vapor_like_phases_split_by_volume() {
        let (mixture, eos) = setup(&[("methane", 0.5), ("ethane", 0.5)]);
        let state = eos.state_point(350.0, 1e6).unwrap();
        let light = state.evaluate(&[0.9, 0.1], RootSelection::Vapor).unwrap();
        let heavy = state.evaluate(&[0.1, 0.9], RootSelection::Vapor).unwrap();
        assert!(heavy.translated_volume < light.translated_volume);

        let kinds = assign(
            &[heavy, light],
            mixture.components(),
            mixture.water_index(),
            350.0,
        );
        assert_eq!(kinds, vec![PhaseKind::Liquid, PhaseKind::Vapor]);
    }

    #[test]
    fn two_hydrocarbon_liquids_keep_the_lighter_one_liquid() {
        let (mixture, eos) = setup(&[("propane", 0.5), ("n-hexane", 0.5)]);
        let state = eos.state_point(250.0, 5e6).unwrap();
        let propane_rich = state.evaluate(&[0.9, 0.1], RootSelection::Liquid).unwrap();
        let hexane_rich = state.evaluate(&[0.1, 0.9], RootSelection::Liquid).unwrap();
        assert!(propane_rich.translated_volume < hexane_rich.translated_volume);
        for phase in [&propane_rich, &hexane_rich] {
            assert_eq!(
                preferred_kind(phase, mixture.components(), None, 250.0),
                PhaseKind::Liquid
            );
        }

        let kinds = assign(
            &[propane_rich, hexane_rich],
            mixture.components(),
            mixture.water_index(),
            250.0,
        );
        assert_eq!(kinds, vec![PhaseKind::Aqueous, PhaseKind::Liquid]);
    }

    #[test]
    fn three_phases_get_distinct_kinds() {
        let (mixture, eos) = setup(&[("water", 0.4), ("n-hexane", 0.3), ("methane", 0.3)]);
        let state = eos.state_point(320.0, 2e6).unwrap();
        let aqueous = state
            .evaluate(&[0.999, 0.0005, 0.0005], RootSelection::Liquid)
            .unwrap();
        let oil = state
            .evaluate(&[0.001, 0.9, 0.099], RootSelection::Liquid)
            .unwrap();
        let gas = state
            .evaluate(&[0.01, 0.03, 0.96], RootSelection::Vapor)
            .unwrap();

        let kinds = assign(
            &[oil, aqueous, gas],
            mixture.components(),
            mixture.water_index(),
            320.0,
        );
        assert_eq!(
            kinds,
            vec![PhaseKind::Liquid, PhaseKind::Aqueous, PhaseKind::Vapor]
        );
    }
}
