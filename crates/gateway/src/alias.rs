// Human-readable connection aliases, e.g. `amber-falcon`.

use rand::seq::SliceRandom;
use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "amber", "brisk", "calm", "dapper", "eager", "fancy", "gentle", "hazy", "icy", "jolly",
    "keen", "lively", "mellow", "nimble", "odd", "plucky", "quiet", "rapid", "silent", "tidy",
    "upbeat", "vivid", "witty", "young", "zesty", "bold", "crisp", "dusty", "early", "frosty",
];

const NOUNS: &[&str] = &[
    "falcon", "badger", "cedar", "dune", "ember", "fjord", "glacier", "harbor", "island",
    "jaguar", "kestrel", "lagoon", "meadow", "nebula", "otter", "pine", "quartz", "river",
    "summit", "tundra", "umbra", "valley", "willow", "yak", "zephyr", "canyon", "delta",
    "heron", "lynx", "maple",
];

/// Generate a two-word hyphenated alias.
pub fn generate() -> String {
    generate_with(&mut rand::thread_rng())
}

fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("quiet");
    let noun = NOUNS.choose(rng).copied().unwrap_or("harbor");
    format!("{adjective}-{noun}")
}
