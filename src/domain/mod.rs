//! Static game tables consulted by the state migrations.
//!
//! These are iteration sources only: the container stores progress keyed by
//! the names listed here, it never stores the tables themselves.

use serde::{Deserialize, Serialize};

/// Minimum number of bubble slots tracked per alchemy color.
pub const BUBBLE_SLOTS: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlchemyColor {
    Orange,
    Green,
    Purple,
    Yellow,
}

impl AlchemyColor {
    pub const ALL: [AlchemyColor; 4] = [
        AlchemyColor::Orange,
        AlchemyColor::Green,
        AlchemyColor::Purple,
        AlchemyColor::Yellow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlchemyColor::Orange => "Orange",
            AlchemyColor::Green => "Green",
            AlchemyColor::Purple => "Purple",
            AlchemyColor::Yellow => "Yellow",
        }
    }
}

impl std::fmt::Display for AlchemyColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Skills added with world 3; older character records lack them.
pub const WORLD3_SKILLS: [&str; 3] = ["Trapping", "Construction", "Worship"];

pub const SKILLS: [&str; 9] = [
    "Mining",
    "Smithing",
    "Choppin",
    "Fishing",
    "Alchemy",
    "Catching",
    "Trapping",
    "Construction",
    "Worship",
];

pub const STATUES: [&str; 30] = [
    "Power",
    "Speed",
    "Mining",
    "Feasty",
    "Health",
    "Kachow",
    "Lumberbob",
    "ThiccSkin",
    "Oceanman",
    "OlReliable",
    "ExpBook",
    "Anvil",
    "Cauldron",
    "Beholder",
    "Bullseye",
    "Box",
    "Twosoul",
    "EhExPee",
    "Seesaw",
    "Pecunia",
    "Mutton",
    "Egg",
    "Battleaxe",
    "Spiral",
    "Boat",
    "Compost",
    "Stealth",
    "Essence",
    "Villager",
    "Dragon",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampCategory {
    Combat,
    Skills,
    Misc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    pub name: &'static str,
    pub category: StampCategory,
}

const fn stamp(name: &'static str, category: StampCategory) -> Stamp {
    Stamp { name, category }
}

pub const STAMPS: &[Stamp] = &[
    stamp("Sword Stamp", StampCategory::Combat),
    stamp("Heart Stamp", StampCategory::Combat),
    stamp("Mana Stamp", StampCategory::Combat),
    stamp("Tomahawk Stamp", StampCategory::Combat),
    stamp("Target Stamp", StampCategory::Combat),
    stamp("Shield Stamp", StampCategory::Combat),
    stamp("Longsword Stamp", StampCategory::Combat),
    stamp("Kindred Stamp", StampCategory::Combat),
    stamp("Big Mana Stamp", StampCategory::Combat),
    stamp("Manamoar Stamp", StampCategory::Combat),
    stamp("Scimitar Stamp", StampCategory::Combat),
    stamp("Haungry Stamp", StampCategory::Combat),
    stamp("Bullseye Stamp", StampCategory::Combat),
    stamp("Feather Stamp", StampCategory::Combat),
    stamp("Polearm Stamp", StampCategory::Combat),
    stamp("Violence Stamp", StampCategory::Combat),
    stamp("Buckler Stamp", StampCategory::Combat),
    stamp("Hermes Stamp", StampCategory::Combat),
    stamp("Sukka Foo", StampCategory::Combat),
    stamp("Arcane Stamp", StampCategory::Combat),
    stamp("Avast Yar Stamp", StampCategory::Combat),
    stamp("Steve Sword", StampCategory::Combat),
    stamp("Blover Stamp", StampCategory::Combat),
    stamp("Stat Graph Stamp", StampCategory::Combat),
    stamp("Pickaxe Stamp", StampCategory::Skills),
    stamp("Hatchet Stamp", StampCategory::Skills),
    stamp("Anvil Zoomer Stamp", StampCategory::Skills),
    stamp("Lil' Mining Baggy Stamp", StampCategory::Skills),
    stamp("Twin Ores Stamp", StampCategory::Skills),
    stamp("Choppin' Bag Stamp", StampCategory::Skills),
    stamp("Duplogs Stamp", StampCategory::Skills),
    stamp("Matty Bag Stamp", StampCategory::Skills),
    stamp("Smart Dirt Stamp", StampCategory::Skills),
    stamp("Cool Diggy Tool Stamp", StampCategory::Skills),
    stamp("High IQ Lumber Stamp", StampCategory::Skills),
    stamp("Swag Swingy Tool Stamp", StampCategory::Skills),
    stamp("Alch Go Brrr Stamp", StampCategory::Skills),
    stamp("Brainstew Stamp", StampCategory::Skills),
    stamp("Drippy Drop Stamp", StampCategory::Skills),
    stamp("Droplots Stamp", StampCategory::Skills),
    stamp("Fishing Rod Stamp", StampCategory::Skills),
    stamp("Fishhead Stamp", StampCategory::Skills),
    stamp("Catch Net Stamp", StampCategory::Skills),
    stamp("Fly Intel Stamp", StampCategory::Skills),
    stamp("Bag o Heads Stamp", StampCategory::Skills),
    stamp("Holy Mackerel Stamp", StampCategory::Skills),
    stamp("Bugsack Stamp", StampCategory::Skills),
    stamp("Buzz Buzz Stamp", StampCategory::Skills),
    stamp("Hidey Box Stamp", StampCategory::Skills),
    stamp("Purp Froge Stamp", StampCategory::Skills),
    stamp("Spikemouth Stamp", StampCategory::Skills),
    stamp("Shiny Crab Stamp", StampCategory::Skills),
    stamp("Gear Stamp", StampCategory::Skills),
    stamp("Stample Stamp", StampCategory::Skills),
    stamp("Saw Stamp", StampCategory::Skills),
    stamp("Amplestample Stamp", StampCategory::Skills),
    stamp("SpoOoky Stamp", StampCategory::Skills),
    stamp("Flowin Stamp", StampCategory::Skills),
    stamp("Prayin Stamp", StampCategory::Skills),
    stamp("Banked Pts Stamp", StampCategory::Skills),
    stamp("Questin Stamp", StampCategory::Misc),
    stamp("Mason Jar Stamp", StampCategory::Misc),
    stamp("Crystallin", StampCategory::Misc),
    stamp("Arcade Ball Stamp", StampCategory::Misc),
    stamp("Gold Ball Stamp", StampCategory::Misc),
    stamp("Potion Stamp", StampCategory::Misc),
    stamp("Golden Apple Stamp", StampCategory::Misc),
    stamp("Ball Timer Stamp", StampCategory::Misc),
    stamp("Card Stamp", StampCategory::Misc),
    stamp("Forge Stamp", StampCategory::Misc),
    stamp("Vendor Stamp", StampCategory::Misc),
    stamp("Sigil Stamp", StampCategory::Misc),
];

pub fn stamp_names() -> impl Iterator<Item = &'static str> {
    STAMPS.iter().map(|s| s.name)
}
