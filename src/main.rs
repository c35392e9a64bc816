use log::info;

use botsim::actor::ActorComponent;
use botsim::bots::{Battery, BotBehavior};
use botsim::config::Config;
use botsim::tasking::GoToPointTask;
use botsim::tile::{ChargingStation, TileType};
use botsim::world::Simulation;
use botsim::WorldState;

/// Bordered map with a few charging stations in the corners.
fn build_world(size_x: i32, size_y: i32, chunk_size: i32, subdivisions: i32) -> WorldState {
    let mut world = WorldState::with_chunking(size_x, size_y, chunk_size, subdivisions);
    for x in 0..size_x {
        world.set_tile(x, 0, TileType::Wall);
        world.set_tile(x, size_y - 1, TileType::Wall);
    }
    for y in 0..size_y {
        world.set_tile(0, y, TileType::Wall);
        world.set_tile(size_x - 1, y, TileType::Wall);
    }
    for (x, y) in [(1, 1), (size_x - 2, size_y - 2)] {
        world.set_tile(x, y, TileType::ChargingStation(ChargingStation::new()));
    }
    world
}

fn dump_map(sim: &Simulation) {
    let (size_x, size_y) = sim.world.size();
    let mut rows = vec![vec!["  "; size_x as usize]; size_y as usize];
    for y in 0..size_y {
        for x in 0..size_x {
            rows[y as usize][x as usize] = match sim.world.tile(x, y) {
                TileType::Space => "..",
                TileType::Wall => "##",
                TileType::TransparentWall(_) => "||",
                TileType::ChargingStation(_) => "()",
            };
        }
    }
    for actor in sim.actors() {
        let (x, y) = actor.body.main_position;
        if x >= 0 && x < size_x && y >= 0 && y < size_y {
            rows[y as usize][x as usize] = "@@";
        }
    }
    for row in rows {
        println!("{}", row.concat());
    }
}

fn main() {
    env_logger::init();
    let config = Config::load();

    let mut world = build_world(
        config.world.size_x,
        config.world.size_y,
        config.world.chunk_size,
        config.world.subdivisions,
    );
    if let Some(path) = &config.layout.path {
        match botsim::world::MapLayout::load(path) {
            Ok(layout) => {
                if let Err(e) = world.apply_layout(&layout) {
                    log::error!("layout {} not applied: {}", path, e);
                }
            }
            Err(e) => log::error!("could not load layout {}: {}", path, e),
        }
    }

    let mut sim = Simulation::new(world);
    sim.low_update_period = config.simulation.low_update_period;
    sim.high_update_period = config.simulation.high_update_period;
    sim.temperature_effect_power = config.simulation.temperature_effect_power;

    let (size_x, size_y) = sim.world.size();
    for i in 0..config.actors.bot_count {
        let mut bot = sim.create_actor(format!("bot-{}", i));
        bot.body.speed = config.actors.default_speed;
        bot.body.rotation_speed = config.actors.rotation_speed;
        bot.body
            .add_component(ActorComponent::Battery(Battery::new()))
            .expect("fresh actor has no components");
        bot.intellect.push_behavior(Box::new(BotBehavior));
        // send each bot wandering toward the far side of the map
        let goal = (
            size_x - 2 - (i as i32 % (size_x - 3)),
            size_y / 2,
        );
        bot.intellect
            .push_task(Box::new(GoToPointTask::new(goal, 1.0, None)));
        let cell = (2 + i as i32 % (size_x - 3), 1 + i as i32 % (size_y - 2));
        sim.spawn(bot, cell).expect("spawning a fresh actor");
    }

    info!(
        "running {} ticks of {}s over a {}x{} map with {} bots",
        config.simulation.tick_count,
        config.simulation.tick_seconds,
        size_x,
        size_y,
        sim.actor_count()
    );
    for _ in 0..config.simulation.tick_count {
        sim.tick(config.simulation.tick_seconds);
    }

    dump_map(&sim);
    println!(
        "simulated {:.1}s of in-game time",
        sim.world.in_game_time()
    );
}
