/* Contracted gaussian shells of one element, as published by basis set
   libraries, together with their NWChem / BSE JSON readers and the pickle
   cache format.
*/

use crate::error::{BasisError, Result};
use crate::helper::double_factorial;
use periodic_table_on_an_enum::Element;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::f64::consts::PI;
use std::fs::File;
use std::io::{Read, Write};

pub const SHELL_LETTERS: [char; 7] = ['S', 'P', 'D', 'F', 'G', 'H', 'I'];

/// One generally contracted shell: every column of `coefficients` is a
/// contracted function built from the same primitive exponents. Coefficients
/// refer to normalized primitives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractedShell {
    pub l: usize,
    pub exponents: Vec<f64>,
    // coefficients[contraction][primitive]
    pub coefficients: Vec<Vec<f64>>,
}

/// <S_lm e^{-a r^2} | S_lm e^{-b r^2}> for Racah normalized solid harmonics.
pub fn radial_overlap(l: usize, a: f64, b: f64) -> f64 {
    let s = a + b;
    let l = l as i32;
    4.0 * PI / (2 * l + 1) as f64 * double_factorial(2 * l + 1)
        / (2f64.powi(l + 2) * s.powi(l + 1))
        * (PI / s).sqrt()
}

impl ContractedShell {
    pub fn nprim(&self) -> usize {
        self.exponents.len()
    }

    pub fn nctr(&self) -> usize {
        self.coefficients.len()
    }

    /// Coefficients for unnormalized monomial primitives such that every
    /// contracted spherical function has unit norm.
    pub fn normalized_coefficients(&self) -> Vec<Vec<f64>> {
        let prim_norm: Vec<f64> = self
            .exponents
            .iter()
            .map(|&a| 1.0 / radial_overlap(self.l, a, a).sqrt())
            .collect();

        self.coefficients
            .iter()
            .map(|column| {
                let scaled: Vec<f64> = column.iter().zip(&prim_norm).map(|(c, n)| c * n).collect();
                let mut norm2 = 0.0;
                for (p, cp) in scaled.iter().enumerate() {
                    for (q, cq) in scaled.iter().enumerate() {
                        norm2 += cp * cq * radial_overlap(self.l, self.exponents[p], self.exponents[q]);
                    }
                }
                let inv = 1.0 / norm2.sqrt();
                scaled.iter().map(|c| c * inv).collect()
            })
            .collect()
    }

    /// Every primitive as its own shell.
    pub fn uncontracted(&self) -> Vec<ContractedShell> {
        self.exponents
            .iter()
            .map(|&a| ContractedShell {
                l: self.l,
                exponents: vec![a],
                coefficients: vec![vec![1.0]],
            })
            .collect()
    }
}

pub enum BasisFormat {
    NWChem,
    Json,
}

/// All shells one basis set assigns to one element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementBasis {
    pub name: String,
    pub symbol: String,
    pub atomic_number: u32,
    pub shells: Vec<ContractedShell>,
}

fn parse_float(token: &str) -> Result<f64> {
    token
        .replace(['D', 'd'], "E")
        .parse::<f64>()
        .map_err(|_| BasisError::Parse(format!("invalid number '{}'", token)))
}

fn shell_l(letter: char) -> Result<usize> {
    SHELL_LETTERS
        .iter()
        .position(|&c| c == letter.to_ascii_uppercase())
        .ok_or_else(|| BasisError::UnsupportedShell(letter.to_string()))
}

fn lookup_element(symbol: &str) -> Result<Element> {
    Element::from_symbol(symbol).ok_or_else(|| BasisError::UnknownElement(symbol.to_string()))
}

impl ElementBasis {
    pub fn parse(name: &str, text: &str, format: BasisFormat) -> Result<Self> {
        match format {
            BasisFormat::NWChem => Self::parse_nwchem(name, text),
            BasisFormat::Json => Self::parse_json(name, text),
        }
    }

    // Example of nwchem format:
    // BASIS "ao basis" SPHERICAL PRINT
    // #BASIS SET: (4s,3p) -> [2s,2p]
    // Mg    S
    // 0.1172280000E+05       0.1977829317E-02
    // 0.1759930000E+04       0.1511399478E-01
    // Mg    SP
    // 0.1891800000E+03      -0.3237170471E-02       0.4928129921E-02
    // 0.4521190000E+02      -0.4100790597E-01       0.3498879944E-01
    // END
    //
    // A block with several coefficient columns is a general contraction,
    // except for SP where the columns belong to the s and p shells.
    pub fn parse_nwchem(name: &str, input: &str) -> Result<Self> {
        let mut symbol: Option<String> = None;
        let mut blocks: Vec<(String, Vec<Vec<f64>>)> = Vec::new();

        for line in input.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let upper = line.to_ascii_uppercase();
            if upper.starts_with("BASIS") || upper == "END" {
                continue;
            }

            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens[0].chars().all(char::is_alphabetic) {
                if tokens.len() < 2 {
                    return Err(BasisError::Parse(format!("malformed shell header '{}'", line)));
                }
                match &symbol {
                    None => symbol = Some(tokens[0].to_string()),
                    Some(s) if !s.eq_ignore_ascii_case(tokens[0]) => {
                        return Err(BasisError::Parse(format!(
                            "atomic name is not consistent: {} vs {}",
                            s, tokens[0]
                        )))
                    }
                    _ => {}
                }
                blocks.push((tokens[1].to_ascii_uppercase(), Vec::new()));
            } else {
                let row = tokens.iter().map(|t| parse_float(t)).collect::<Result<Vec<f64>>>()?;
                match blocks.last_mut() {
                    Some((_, rows)) => rows.push(row),
                    None => {
                        return Err(BasisError::Parse(format!("data line before any shell: '{}'", line)))
                    }
                }
            }
        }

        let symbol = symbol.ok_or_else(|| BasisError::Parse("no shells found".to_string()))?;
        let element = lookup_element(&symbol)?;

        let mut shells = Vec::new();
        for (kind, rows) in blocks {
            if rows.is_empty() {
                return Err(BasisError::Parse(format!("empty {} block", kind)));
            }
            let ncol = rows[0].len();
            if ncol < 2 || rows.iter().any(|r| r.len() != ncol) {
                return Err(BasisError::Parse(format!("ragged {} block", kind)));
            }
            let exponents: Vec<f64> = rows.iter().map(|r| r[0]).collect();
            let column = |c: usize| rows.iter().map(|r| r[c]).collect::<Vec<f64>>();

            if kind == "SP" || kind == "L" {
                if ncol != 3 {
                    return Err(BasisError::Parse("SP block needs two coefficient columns".to_string()));
                }
                shells.push(ContractedShell { l: 0, exponents: exponents.clone(), coefficients: vec![column(1)] });
                shells.push(ContractedShell { l: 1, exponents, coefficients: vec![column(2)] });
            } else {
                let mut letters = kind.chars();
                let l = match (letters.next(), letters.next()) {
                    (Some(c), None) => shell_l(c)?,
                    _ => return Err(BasisError::UnsupportedShell(kind.clone())),
                };
                shells.push(ContractedShell {
                    l,
                    exponents,
                    coefficients: (1..ncol).map(column).collect(),
                });
            }
        }

        Ok(ElementBasis {
            name: name.to_string(),
            symbol: element.get_symbol().to_string(),
            atomic_number: element.get_atomic_number() as u32,
            shells,
        })
    }

    /// Parses the Basis Set Exchange JSON layout for the first element it lists.
    pub fn parse_json(name: &str, input: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(input)?;
        let elements = root
            .get("elements")
            .and_then(Value::as_object)
            .ok_or_else(|| BasisError::Parse("missing 'elements' table".to_string()))?;
        let (z, data) = elements
            .iter()
            .next()
            .ok_or_else(|| BasisError::Parse("empty 'elements' table".to_string()))?;
        let z: u32 = z
            .parse()
            .map_err(|_| BasisError::Parse(format!("bad atomic number '{}'", z)))?;
        let element = Element::from_atomic_number(z as usize)
            .ok_or_else(|| BasisError::UnknownElement(z.to_string()))?;

        let as_f64 = |v: &Value| -> Result<f64> {
            match v {
                Value::String(s) => parse_float(s),
                Value::Number(n) => n
                    .as_f64()
                    .ok_or_else(|| BasisError::Parse(format!("bad number {}", n))),
                other => Err(BasisError::Parse(format!("unexpected value {}", other))),
            }
        };

        let mut shells = Vec::new();
        let electron_shells = data
            .get("electron_shells")
            .and_then(Value::as_array)
            .ok_or_else(|| BasisError::Parse("missing 'electron_shells'".to_string()))?;
        for shell in electron_shells {
            let am: Vec<usize> = shell["angular_momentum"]
                .as_array()
                .ok_or_else(|| BasisError::Parse("missing angular_momentum".to_string()))?
                .iter()
                .filter_map(Value::as_u64)
                .map(|l| l as usize)
                .collect();
            let exponents = shell["exponents"]
                .as_array()
                .ok_or_else(|| BasisError::Parse("missing exponents".to_string()))?
                .iter()
                .map(as_f64)
                .collect::<Result<Vec<f64>>>()?;
            let columns = shell["coefficients"]
                .as_array()
                .ok_or_else(|| BasisError::Parse("missing coefficients".to_string()))?
                .iter()
                .map(|col| {
                    col.as_array()
                        .ok_or_else(|| BasisError::Parse("coefficient column is not a list".to_string()))?
                        .iter()
                        .map(as_f64)
                        .collect::<Result<Vec<f64>>>()
                })
                .collect::<Result<Vec<Vec<f64>>>>()?;
            if columns.iter().any(|c| c.len() != exponents.len()) {
                return Err(BasisError::Parse("coefficient column length mismatch".to_string()));
            }

            if am.len() == 1 {
                shells.push(ContractedShell { l: am[0], exponents, coefficients: columns });
            } else if am.len() == columns.len() {
                // fused shells such as SP carry one column per angular momentum
                for (l, column) in am.into_iter().zip(columns) {
                    shells.push(ContractedShell { l, exponents: exponents.clone(), coefficients: vec![column] });
                }
            } else {
                return Err(BasisError::Parse("angular momentum / coefficient mismatch".to_string()));
            }
        }

        Ok(ElementBasis {
            name: name.to_string(),
            symbol: element.get_symbol().to_string(),
            atomic_number: z,
            shells,
        })
    }

    /// Number of spherical functions.
    pub fn nao(&self) -> usize {
        self.shells.iter().map(|s| s.nctr() * (2 * s.l + 1)).sum()
    }
}

impl ElementBasis {
    // Serialize to pickle format
    pub fn to_pickle(&self) -> Result<Vec<u8>> {
        let options = serde_pickle::SerOptions::new();
        Ok(serde_pickle::to_vec(self, options)?)
    }

    // Deserialize from pickle format
    pub fn from_pickle(bytes: &[u8]) -> Result<Self> {
        let options = serde_pickle::DeOptions::new();
        Ok(serde_pickle::from_slice(bytes, options)?)
    }

    // Save to file in pickle format
    pub fn save_to_file(&self, filename: &str) -> Result<()> {
        let serialized = self.to_pickle()?;
        let mut file = File::create(filename)?;
        file.write_all(&serialized)?;
        Ok(())
    }

    // Load from file in pickle format
    pub fn load_from_file(filename: &str) -> Result<Self> {
        let mut file = File::open(filename)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        Self::from_pickle(&buffer)
    }
}
