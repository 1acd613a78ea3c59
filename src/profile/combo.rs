//! Chord (combo) detection
//!
//! A combo rule is a button chord held continuously for a dwell time. While
//! the chord is armed the buttons still pass through unchanged; once the rule
//! fires, the chord is suppressed from the output and the rule's action
//! applies until the chord is released. Rules compete by specificity: the
//! rule with the largest mask wins, ties go to the first declared.

use smlang::statemachine;

use crate::event::{Button, Buttons};

/// Upper bound on built-in + custom rules evaluated together
pub const MAX_RULES: usize = 8;

/// What a fired rule does
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum ComboAction {
    /// Hold a synthesized button while the chord stays down
    Press(Button),
    /// Switch the active profile (one-shot on fire)
    SwitchProfile(u8),
}

/// One chord rule
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub struct ComboRule {
    /// Chord of abstract button masks that must all be held
    pub mask: u32,
    /// How long the chord must be held continuously, in milliseconds
    pub dwell_ms: u16,
    pub action: ComboAction,
}

/// Result of one detection step, to be applied to the outgoing buttons
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Effect {
    /// Button bits to remove from the output
    pub suppress: u32,
    /// Button bits to add to the output
    pub press: u32,
    /// Profile index to activate (set once, on the firing tick)
    pub switch_to: Option<u8>,
}

statemachine! {
    transitions: {
        *Idle + ChordHeld / arm = Arming,
        Arming + ChordHeld / arm = Arming,
        Arming + ChordLost / disarm = Idle,
        Arming + DwellElapsed / fire = Fired,
        Fired + ChordLost / disarm = Idle,
    }
}

pub struct Context {
    now: u32,
    candidate: u8,
    candidate_mask: u32,
    candidate_dwell: u16,
    armed: Option<u8>,
    armed_mask: u32,
    deadline: u32,
    just_fired: bool,
}

impl StateMachineContext for Context {
    fn arm(&mut self) {
        // Re-arming with the same rule keeps the original deadline so a held
        // chord is not restarted every tick
        if self.armed != Some(self.candidate) {
            self.armed = Some(self.candidate);
            self.armed_mask = self.candidate_mask;
            self.deadline = self.now.wrapping_add(self.candidate_dwell as u32);
        }
    }

    fn disarm(&mut self) {
        self.armed = None;
        self.armed_mask = 0;
    }

    fn fire(&mut self) {
        self.just_fired = true;
    }
}

/// Per-player combo detector
pub struct Detector {
    fsm: StateMachine<Context>,
    /// Press mask of the fired rule, applied while the chord stays held
    fired_press: u32,
}

impl Default for Detector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector {
    pub fn new() -> Self {
        Self {
            fsm: StateMachine::new(Context {
                now: 0,
                candidate: 0,
                candidate_mask: 0,
                candidate_dwell: 0,
                armed: None,
                armed_mask: 0,
                deadline: 0,
                just_fired: false,
            }),
            fired_press: 0,
        }
    }

    /// Most specific rule whose chord is fully held
    fn candidate(rules: &[ComboRule], buttons: Buttons) -> Option<(u8, &ComboRule)> {
        let mut best: Option<(u8, &ComboRule)> = None;
        for (index, rule) in rules.iter().enumerate() {
            if rule.mask == 0 || !buttons.contains_all(rule.mask) {
                continue;
            }
            let better = match best {
                // Strictly larger mask wins; on ties the first declared stays
                Some((_, b)) => rule.mask.count_ones() > b.mask.count_ones(),
                None => true,
            };
            if better {
                best = Some((index as u8, rule));
            }
        }
        best
    }

    /// Advance detection by one tick and report the effect on the output
    pub fn step(&mut self, rules: &[ComboRule], buttons: Buttons, now_ms: u32) -> Effect {
        self.fsm.context.now = now_ms;
        self.fsm.context.just_fired = false;

        if matches!(*self.fsm.state(), States::Fired) {
            let mask = self.fsm.context.armed_mask;
            if !buttons.contains_all(mask) {
                self.fsm.process_event(Events::ChordLost).ok();
                self.fired_press = 0;
                return Effect::default();
            }
            return Effect {
                suppress: mask,
                press: self.fired_press,
                switch_to: None,
            };
        }

        match Self::candidate(rules, buttons) {
            Some((index, rule)) => {
                self.fsm.context.candidate = index;
                self.fsm.context.candidate_mask = rule.mask;
                self.fsm.context.candidate_dwell = rule.dwell_ms;
                self.fsm.process_event(Events::ChordHeld).ok();
            }
            None => {
                self.fsm.process_event(Events::ChordLost).ok();
            }
        }

        if matches!(*self.fsm.state(), States::Arming)
            && now_ms.wrapping_sub(self.fsm.context.deadline) < u32::MAX / 2
        {
            self.fsm.process_event(Events::DwellElapsed).ok();
        }

        if !self.fsm.context.just_fired {
            return Effect::default();
        }

        // Rule index is stable because the ruleset cannot change mid-step
        let index = self.fsm.context.armed.unwrap_or(0);
        let rule = &rules[index as usize];
        match rule.action {
            ComboAction::Press(button) => {
                self.fired_press = button.mask();
                Effect {
                    suppress: rule.mask,
                    press: self.fired_press,
                    switch_to: None,
                }
            }
            ComboAction::SwitchProfile(profile) => {
                self.fired_press = 0;
                Effect {
                    suppress: rule.mask,
                    press: 0,
                    switch_to: Some(profile),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chord(buttons: &[Button]) -> Buttons {
        buttons.iter().copied().collect()
    }

    fn rule(mask: Buttons, dwell_ms: u16, action: ComboAction) -> ComboRule {
        ComboRule {
            mask: mask.0,
            dwell_ms,
            action,
        }
    }

    #[test]
    fn fires_after_dwell_and_suppresses_chord() {
        let rules = [rule(
            chord(&[Button::S1, Button::S2]),
            100,
            ComboAction::Press(Button::A1),
        )];
        let mut det = Detector::new();
        let held = chord(&[Button::S1, Button::S2]);

        // Held but not yet for the dwell time: no effect
        assert_eq!(det.step(&rules, held, 0), Effect::default());
        assert_eq!(det.step(&rules, held, 50), Effect::default());

        // Dwell elapsed: chord replaced by the synthesized button
        let fired = det.step(&rules, held, 100);
        assert_eq!(fired.suppress, held.0);
        assert_eq!(fired.press, Button::A1.mask());

        // Stays active while held
        let still = det.step(&rules, held, 150);
        assert_eq!(still.press, Button::A1.mask());

        // Release returns to idle
        assert_eq!(det.step(&rules, Buttons::NONE, 200), Effect::default());
    }

    #[test]
    fn release_before_dwell_disarms() {
        let rules = [rule(
            chord(&[Button::S1, Button::S2]),
            100,
            ComboAction::Press(Button::A1),
        )];
        let mut det = Detector::new();
        let held = chord(&[Button::S1, Button::S2]);

        det.step(&rules, held, 0);
        det.step(&rules, Buttons::NONE, 50);
        // Holding again restarts the dwell from scratch
        assert_eq!(det.step(&rules, held, 60), Effect::default());
        assert_eq!(det.step(&rules, held, 120), Effect::default());
        assert_eq!(det.step(&rules, held, 160).press, Button::A1.mask());
    }

    #[test]
    fn larger_mask_wins() {
        let rules = [
            rule(
                chord(&[Button::S1, Button::S2]),
                0,
                ComboAction::Press(Button::A1),
            ),
            rule(
                chord(&[Button::S1, Button::S2, Button::DpadUp]),
                0,
                ComboAction::Press(Button::A2),
            ),
        ];
        let mut det = Detector::new();
        let held = chord(&[Button::S1, Button::S2, Button::DpadUp]);
        assert_eq!(det.step(&rules, held, 0).press, Button::A2.mask());
    }

    #[test]
    fn tie_goes_to_first_declared() {
        let rules = [
            rule(
                chord(&[Button::S1, Button::S2]),
                0,
                ComboAction::Press(Button::A1),
            ),
            rule(
                chord(&[Button::S1, Button::B1]),
                0,
                ComboAction::Press(Button::A2),
            ),
        ];
        let mut det = Detector::new();
        let held = chord(&[Button::S1, Button::S2, Button::B1]);
        assert_eq!(det.step(&rules, held, 0).press, Button::A1.mask());
    }

    #[test]
    fn profile_switch_is_one_shot() {
        let rules = [rule(
            chord(&[Button::S1, Button::DpadRight]),
            0,
            ComboAction::SwitchProfile(2),
        )];
        let mut det = Detector::new();
        let held = chord(&[Button::S1, Button::DpadRight]);

        let fired = det.step(&rules, held, 0);
        assert_eq!(fired.switch_to, Some(2));
        assert_eq!(fired.suppress, held.0);

        // While still held: chord stays suppressed but no repeated switch
        let still = det.step(&rules, held, 10);
        assert_eq!(still.switch_to, None);
        assert_eq!(still.suppress, held.0);

        assert_eq!(det.step(&rules, Buttons::NONE, 20), Effect::default());
    }
}
