//! Category / requirement classification of scraped classes.
//!
//! Rules live in two ordered tables. [`CASCADE`] is evaluated top to bottom and
//! the first rule whose predicate holds decides the result. [`OVERRIDES`] are
//! evaluated afterwards regardless of what the cascade decided; every matching
//! override replaces the result, so a later override wins over an earlier one.
//!
//! Matching is case-insensitive substring matching on the lower-cased category
//! label and class name. An absent (or blank) category label is the empty
//! string, which is how name-only rules recognise calendar-page sources.

use std::sync::LazyLock;
use log::trace;
use regex::Regex;
use rocket::serde::Serialize;
use crate::model::{Category, Requirement};

#[derive(Serialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct Classification {
    pub category: Category,
    pub requirement: Requirement,
}
impl Default for Classification {
    fn default() -> Self {
        c(Category::NotSet, Requirement::NotSet)
    }
}

const fn c(category: Category, requirement: Requirement) -> Classification {
    Classification { category, requirement }
}

/// Lower-cased class text the rules look at.
#[derive(Debug)]
pub struct ClassText {
    category: String,
    name: String,
}
impl ClassText {
    pub fn new(category: Option<&str>, name: &str) -> Self {
        Self {
            category: category.map(|s| s.trim().to_lowercase()).unwrap_or_default(),
            name: name.trim().to_lowercase(),
        }
    }
    fn has_category(&self) -> bool {
        !self.category.is_empty()
    }
    fn cat(&self, needle: &str) -> bool {
        self.category.contains(needle)
    }
    fn cat_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.cat(n))
    }
    fn name(&self, needle: &str) -> bool {
        self.name.contains(needle)
    }
    fn name_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.name(n))
    }
    /// Name-only match, used when the source gave no category label.
    fn bare_name(&self, needle: &str) -> bool {
        !self.has_category() && self.name(needle)
    }
}

pub struct Rule {
    pub name: &'static str,
    pub matches: fn(&ClassText) -> bool,
    pub apply: fn(&ClassText) -> Classification,
}

static BJJ_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"randori|bjj|no[- ]gi|drilling").expect("valid pattern"));
static STRIKING_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"muay thai|kickboxing").expect("valid pattern"));
static KIDS_WRESTLING_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"wrestling for youth").expect("valid pattern"));

const OPEN_LEVEL_BJJ: &[&str] = &["flow roll", "fundamentals", "family", "all levels", "all-levels", "intro", "int/fund"];
const OPEN_LEVEL_BJJ_FALLBACK: &[&str] = &["all levels", "fundamentals", "no gi", "no-gi", "family", "drilling"];

fn is_kids_striking_label(t: &ClassText) -> bool {
    t.cat_any(&["kids muay thai", "youth kick"])
}

fn intermediate_not_fundamentals(t: &ClassText) -> bool {
    t.name("intermediate") && !t.name("fundamentals")
}

fn adult_bjj_requirement(t: &ClassText) -> Requirement {
    if t.name("beware") {
        Requirement::PurpleBelt
    } else if t.name("advanced") {
        Requirement::BlueBelt
    } else if t.name("randori") {
        if t.name_any(&["all levels", "all-levels"]) {
            Requirement::None
        } else if t.name("160") {
            Requirement::TwoStripesUnder160
        } else if t.name("40") {
            Requirement::Over40
        } else {
            Requirement::WhiteBeltTwoStripes
        }
    } else if t.name("competition training") {
        Requirement::WhiteBeltTwoStripes
    } else if t.name("adv/int") || intermediate_not_fundamentals(t) {
        Requirement::WhiteBeltTwoStripes
    } else if t.name("200") {
        Requirement::Over200Lbs
    } else if t.name("women") {
        Requirement::Female
    } else if t.name_any(OPEN_LEVEL_BJJ) {
        Requirement::None
    } else {
        Requirement::NotSet
    }
}

fn striking_requirement(t: &ClassText) -> Requirement {
    if t.name("blue shirt") {
        Requirement::BlueShirt
    } else if t.name_any(&["competition", "sparring", "green shirt"]) {
        Requirement::GreenShirt
    } else if t.name_any(&["advanced", "intermediate", "orange shirt"]) {
        Requirement::OrangeShirt
    } else if t.name_any(&["muay thai", "thai pad", "clinch"]) {
        Requirement::YellowShirt
    } else if t.name_any(&["kickboxing", "open mat", "fundamentals of striking", "teens"]) {
        Requirement::None
    } else if t.name("invite only") {
        Requirement::Invitation
    } else {
        Requirement::NotSet
    }
}

/// First match wins.
pub const CASCADE: &[Rule] = &[
    Rule {
        // strict subset of the kids and youth buckets below
        name: "little-tigers",
        matches: |t| t.cat("little tigers")
            || (t.cat("youth bjj") && t.name("lil yeti"))
            || t.bare_name("little tigers"),
        apply: |_| c(Category::LittleTigers, Requirement::None),
    },
    Rule {
        name: "youth-bjj",
        matches: |t| t.cat("youth bjj"),
        apply: |t| if t.name("yeti") {
            c(Category::KidsBjj, Requirement::None)
        } else {
            c(Category::KidsBjj, Requirement::YellowBelt)
        },
    },
    Rule {
        // kids striking labels also say "kids" and are claimed by "kids-striking"
        name: "kids",
        matches: |t| t.cat("kids") && !t.cat("tiger") && !is_kids_striking_label(t),
        apply: |t| if t.name("advanced") {
            c(Category::KidsBjj, Requirement::SolidGreyBelt)
        } else if t.name("wrestling for youth") {
            c(Category::KidsWrestling, Requirement::None)
        } else {
            c(Category::KidsBjj, Requirement::None)
        },
    },
    Rule {
        name: "tigers",
        matches: |t| t.cat("tigers")
            || (!t.has_category() && t.name_any(&["kids martial arts", "tiger"])),
        apply: |t| if t.name("invite-only") {
            c(Category::KidsBjj, Requirement::Invitation)
        } else if t.name_any(&["advanced", "competition"]) {
            c(Category::KidsBjj, Requirement::SolidGreyBelt)
        } else if t.name("comp") {
            c(Category::KidsBjj, Requirement::GreyWhiteBelt)
        } else {
            c(Category::KidsBjj, Requirement::None)
        },
    },
    Rule {
        name: "kids-seminar",
        matches: |t| t.cat("seminar") && t.name("kids"),
        apply: |_| c(Category::KidsBjj, Requirement::None),
    },
    Rule {
        name: "kids-names",
        matches: |t| !t.has_category() && t.name_any(&["kids competition", "tigers", "teen bjj"]),
        apply: |t| if t.name("kids competition") {
            c(Category::KidsBjj, Requirement::YellowBelt)
        } else if t.name("tigers") {
            c(Category::KidsBjj, Requirement::None)
        } else {
            c(Category::KidsBjj, Requirement::Invitation)
        },
    },
    Rule {
        name: "kids-striking",
        matches: |t| is_kids_striking_label(t) || t.bare_name("kids muay thai"),
        apply: |_| c(Category::KidsStriking, Requirement::None),
    },
    Rule {
        name: "adult-bjj",
        matches: |t| t.cat("bjj") || (t.bare_name("bjj") && !t.name("tiger")),
        apply: |t| if t.name("wrestling") {
            c(Category::Wrestling, Requirement::TwoStripesOrWrestling)
        } else if t.name("yoga") {
            c(Category::Yoga, Requirement::None)
        } else if t.name("mma") {
            c(Category::Mma, Requirement::GreenShirtFourStripe)
        } else {
            c(Category::Bjj, adult_bjj_requirement(t))
        },
    },
    Rule {
        name: "adult-bjj-by-name",
        matches: |t| !t.has_category() && BJJ_NAME.is_match(&t.name),
        apply: |t| {
            let requirement = if t.name("advanced") {
                Requirement::BlueBelt
            } else if intermediate_not_fundamentals(t) || t.name("randori") {
                Requirement::WhiteBeltTwoStripes
            } else if t.name_any(OPEN_LEVEL_BJJ_FALLBACK) {
                Requirement::None
            } else {
                Requirement::NotSet
            };
            c(Category::Bjj, requirement)
        },
    },
    Rule {
        name: "conditioning",
        matches: |t| t.cat("conditioning"),
        apply: |_| c(Category::Conditioning, Requirement::None),
    },
    Rule {
        name: "open-gym",
        matches: |t| t.cat_any(&["open gym", "open mat"]),
        apply: |_| c(Category::OpenGym, Requirement::None),
    },
    Rule {
        name: "striking",
        matches: |t| t.cat_any(&["muay thai", "striking"]),
        apply: |t| c(Category::Striking, striking_requirement(t)),
    },
    Rule {
        name: "striking-by-name",
        matches: |t| !t.has_category() && STRIKING_NAME.is_match(&t.name),
        apply: |t| if t.name("muay thai") {
            c(Category::Striking, Requirement::YellowShirt)
        } else {
            c(Category::Striking, Requirement::None)
        },
    },
    Rule {
        name: "pro-fight-team",
        matches: |t| t.cat("pro fight team"),
        apply: |_| c(Category::Mma, Requirement::Invitation),
    },
];

/// Applied after the cascade, each one that matches replaces the result.
pub const OVERRIDES: &[Rule] = &[
    Rule {
        name: "fitness",
        matches: |t| t.bare_name("fitness"),
        apply: |_| c(Category::Conditioning, Requirement::None),
    },
    Rule {
        name: "private-lesson",
        matches: |t| t.bare_name("private lesson"),
        apply: |_| c(Category::PrivateLesson, Requirement::None),
    },
    Rule {
        name: "wrestling-for-youth",
        matches: |t| KIDS_WRESTLING_NAME.is_match(&t.name),
        apply: |_| c(Category::KidsWrestling, Requirement::None),
    },
];

fn fired_rules(t: &ClassText) -> impl Iterator<Item = &'static Rule> + '_ {
    CASCADE.iter()
        .find(|rule| (rule.matches)(t))
        .into_iter()
        .chain(OVERRIDES.iter().filter(|rule| (rule.matches)(t)))
}

pub fn classify(category: Option<&str>, name: &str) -> Classification {
    let t = ClassText::new(category, name);
    let result = fired_rules(&t)
        .fold(Classification::default(), |_, rule| (rule.apply)(&t));
    trace!("classify {:?} / {:?} -> {:?}", category, name, result);
    result
}

/// Names of the rules that contributed to [`classify`]'s result, in evaluation order.
pub fn matched_rules(category: Option<&str>, name: &str) -> Vec<&'static str> {
    let t = ClassText::new(category, name);
    fired_rules(&t).map(|rule| rule.name).collect()
}
