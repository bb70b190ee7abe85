// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! `%s`-style pronoun substitution.
//!
//! Markers: `%s` subjective, `%o` objective, `%p` possessive, `%r` reflexive, `%n` name. An
//! uppercase marker capitalizes the substitution. `%%` is a literal percent sign; unknown
//! markers are left as they are.

use thicket_common::{ThingType, Value};

use crate::thing::{PRONOUNS, Thing};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pronouns {
    pub subjective: &'static str,
    pub objective: &'static str,
    pub possessive: &'static str,
    pub reflexive: &'static str,
}

pub const IT: Pronouns = Pronouns {
    subjective: "it",
    objective: "it",
    possessive: "its",
    reflexive: "itself",
};
pub const HE: Pronouns = Pronouns {
    subjective: "he",
    objective: "him",
    possessive: "his",
    reflexive: "himself",
};
pub const SHE: Pronouns = Pronouns {
    subjective: "she",
    objective: "her",
    possessive: "her",
    reflexive: "herself",
};
pub const THEY: Pronouns = Pronouns {
    subjective: "they",
    objective: "them",
    possessive: "their",
    reflexive: "themselves",
};

impl Pronouns {
    pub fn named(name: &str) -> Option<Pronouns> {
        match name.trim().to_lowercase().as_str() {
            "it" => Some(IT),
            "he" => Some(HE),
            "she" => Some(SHE),
            "they" => Some(THEY),
            _ => None,
        }
    }

    /// The set declared in `thing`'s `pronouns` property. Players default to "they",
    /// everything else to "it".
    pub fn of(thing: &Thing) -> Pronouns {
        thing
            .property(PRONOUNS)
            .and_then(Value::as_str)
            .and_then(Pronouns::named)
            .unwrap_or(match thing.thing_type {
                ThingType::Player => THEY,
                _ => IT,
            })
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn pronoun_sub(thing: &Thing, text: &str) -> String {
    let pronouns = Pronouns::of(thing);
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(marker) = chars.next() else {
            out.push('%');
            break;
        };
        let word = match marker.to_ascii_lowercase() {
            's' => pronouns.subjective,
            'o' => pronouns.objective,
            'p' => pronouns.possessive,
            'r' => pronouns.reflexive,
            'n' => thing.name.as_str(),
            '%' => {
                out.push('%');
                continue;
            }
            _ => {
                out.push('%');
                out.push(marker);
                continue;
            }
        };
        if marker.is_ascii_uppercase() {
            out.push_str(&capitalize(word));
        } else {
            out.push_str(word);
        }
    }
    out
}
