use log::debug;

use crate::actor::ActorBody;
use crate::intellect::{Behavior, BehaviorId, Intellect};
use crate::tasking::FindAndGoToPointTask;
use crate::tile::TileType;
use crate::world::WorldState;

const FULL_CHARGE: f32 = 100.0;

/// Battery state for a bot. Drains while running, charges while the
/// bot stands on an online charging station.
#[derive(Debug, Clone)]
pub struct Battery {
    charge_level: f32,
    pub consumption_rate: f32,
    pub charging_rate: f32,
    charging: bool,
}

impl Default for Battery {
    fn default() -> Self {
        Battery {
            charge_level: FULL_CHARGE,
            consumption_rate: 1.0,
            charging_rate: 5.0,
            charging: false,
        }
    }
}

impl Battery {
    pub fn new() -> Self {
        Battery::default()
    }

    pub fn charge_level(&self) -> f32 {
        self.charge_level
    }

    pub fn set_charge_level(&mut self, level: f32) {
        self.charge_level = level.clamp(0.0, FULL_CHARGE);
    }

    pub fn is_charging(&self) -> bool {
        self.charging
    }

    pub fn is_dead(&self) -> bool {
        self.charge_level <= 0.0
    }

    pub fn update(&mut self, dt: f32, main_position: (i32, i32), world: &WorldState) {
        self.charging = matches!(
            world.tile(main_position.0, main_position.1),
            TileType::ChargingStation(station) if station.online
        );
        if self.charging {
            self.charge_level = (self.charge_level + self.charging_rate * dt).min(FULL_CHARGE);
        } else {
            self.charge_level = (self.charge_level - self.consumption_rate * dt).max(0.0);
        }
    }
}

/// Sends the bot to the nearest usable charging station once its
/// battery drops below the anxiety threshold. The urge scales with
/// how empty the battery is: the outstanding task is re-priced to
/// `100 - charge` every tick, so a draining battery eventually
/// preempts whatever else the bot is doing.
pub struct ChargeAnxietyBehavior {
    pub anxiety_threshold: f32,
    task: Option<crate::intellect::TaskId>,
}

impl Default for ChargeAnxietyBehavior {
    fn default() -> Self {
        ChargeAnxietyBehavior {
            anxiety_threshold: 30.0,
            task: None,
        }
    }
}

impl ChargeAnxietyBehavior {
    pub fn new() -> Self {
        ChargeAnxietyBehavior::default()
    }
}

impl Behavior for ChargeAnxietyBehavior {
    fn update(
        &mut self,
        _dt: f32,
        me: BehaviorId,
        intellect: &mut Intellect,
        body: &mut ActorBody,
        _world: &WorldState,
    ) {
        let Some(charge) = body.battery().map(|b| b.charge_level()) else {
            return;
        };
        if let Some(id) = self.task {
            match intellect.task_core_mut(id) {
                Some(core) if !core.ended() => {
                    core.priority = FULL_CHARGE - charge;
                }
                // ended or already purged, the slot is free again
                _ => self.task = None,
            }
        }
        if self.task.is_none() && charge < self.anxiety_threshold {
            debug!(
                "actor {} battery at {:.1}%, seeking a charging station",
                body.id(),
                charge
            );
            let task = FindAndGoToPointTask::new(
                Box::new(|world: &WorldState, p: (i32, i32)| {
                    matches!(
                        world.tile(p.0, p.1),
                        TileType::ChargingStation(station) if station.is_usable()
                    )
                }),
                100.0,
                FULL_CHARGE - charge,
                Some(me),
            );
            self.task = Some(intellect.push_task(Box::new(task)));
        }
    }
}

/// Baseline behavior for bots; installs the battery policies when
/// attached.
pub struct BotBehavior;

impl Behavior for BotBehavior {
    fn on_add(
        &mut self,
        _me: BehaviorId,
        intellect: &mut Intellect,
        _body: &mut ActorBody,
        _world: &WorldState,
    ) {
        intellect.push_behavior(Box::new(ChargeAnxietyBehavior::new()));
    }
}
