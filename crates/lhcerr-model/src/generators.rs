//! Deterministic demo machine used by examples and tests.
//!
//! The generated model is a two-line collider ring with LHC-flavoured
//! element names: eight octants per line, a short FODO arc per octant,
//! spool-piece correctors, steering kickers, monitors and a handful of
//! shared insertion elements that exist in both lines under one name.

use lhcerr_core::errors::Fault;

use crate::element::{Element, ElementKind};
use crate::line::Line;
use crate::model::LatticeModel;
use crate::vars::Expr;

/// Octants of the demo ring.
pub const DEMO_OCTANTS: [u32; 8] = [1, 2, 3, 4, 5, 6, 7, 8];
/// Arc cells installed per octant.
pub const DEMO_CELLS: [u32; 2] = [2, 3];
/// Octants whose cell-2 horizontal steering circuit is driven by a
/// crossing knob instead of being freely trimmable.
pub const DEMO_CROSSING_OCTANTS: [u32; 4] = [1, 2, 5, 8];

const BEND_LENGTH: f64 = 14.3;
const QUAD_LENGTH: f64 = 3.1;
const TRIM_QUAD_LENGTH: f64 = 0.32;
const SEXT_LENGTH: f64 = 0.37;
const OCT_LENGTH: f64 = 0.32;
const KICKER_LENGTH: f64 = 0.65;
const CELL_DRIFT: f64 = 2.6;

/// Builds the demo machine: lines `lhcb1` and `lhcb2` plus the shared
/// variable graph with circuit and crossing-knob wiring.
pub fn build_demo_model() -> Result<LatticeModel, Fault> {
    let mut model = LatticeModel::new();
    for beam in ["b1", "b2"] {
        let mut line = Line::new(format!("lhc{beam}"));
        for octant in DEMO_OCTANTS {
            build_octant(&mut line, octant, beam)?;
        }
        model.add_line(line)?;
    }
    install_demo_vars(&mut model)?;
    Ok(model)
}

fn build_octant(line: &mut Line, octant: u32, beam: &str) -> Result<(), Fault> {
    let n_bends = (DEMO_OCTANTS.len() * DEMO_CELLS.len() * 2) as f64;
    let bend_k0 = std::f64::consts::TAU / (n_bends * BEND_LENGTH);

    // Insertion region: shared marker and shared low-beta quadrupole.
    line.append(format!("ip{octant}"), Element::new(ElementKind::Marker, 0.0))?;
    line.append(
        format!("mq.1r{octant}"),
        Element::new(ElementKind::Quadrupole, QUAD_LENGTH).with_k_ref(0.0087),
    )?;
    if DEMO_CROSSING_OCTANTS.contains(&octant) {
        line.append(
            format!("mbrc.4r{octant}.{beam}"),
            Element::new(ElementKind::Bend, 9.45).with_k_ref(6.0e-4),
        )?;
    }

    for cell in DEMO_CELLS {
        // Even cells focus, odd cells defocus.
        let focusing = cell % 2 == 0;
        let polarity = if focusing { 1.0 } else { -1.0 };
        drift(line, octant, beam, cell, 0)?;
        line.append(
            format!("mb.a{cell}r{octant}.{beam}"),
            Element::new(ElementKind::Bend, BEND_LENGTH).with_k_ref(bend_k0),
        )?;
        drift(line, octant, beam, cell, 1)?;
        let (plane, steering_knob) = if focusing {
            ("h", format!("acbh.{cell}r{octant}.{beam}"))
        } else {
            ("v", format!("acbv.{cell}r{octant}.{beam}"))
        };
        line.append(
            format!("mcb{plane}.{cell}r{octant}.{beam}"),
            Element::new(ElementKind::Kicker, KICKER_LENGTH).with_knob(steering_knob),
        )?;
        line.append(
            format!("bpm.{cell}r{octant}.{beam}"),
            Element::new(ElementKind::Monitor, 0.0),
        )?;
        if octant == 1 && cell == 2 {
            // Slicing leftovers that monitor discovery must skip.
            line.append(
                format!("bpm.{cell}r{octant}.{beam}_entry"),
                Element::new(ElementKind::Marker, 0.0),
            )?;
        }
        line.append(
            format!("mq.{cell}r{octant}.{beam}"),
            Element::new(ElementKind::Quadrupole, QUAD_LENGTH).with_k_ref(polarity * 0.0087),
        )?;
        let arc = arc_label(octant);
        let trim_knob = if focusing {
            format!("kqtf.{arc}{beam}")
        } else {
            format!("kqtd.{arc}{beam}")
        };
        line.append(
            format!("mqt.{cell}r{octant}.{beam}"),
            Element::new(ElementKind::Quadrupole, TRIM_QUAD_LENGTH).with_knob(trim_knob),
        )?;
        let sext_knob = if focusing {
            format!("ksf.{beam}")
        } else {
            format!("ksd.{beam}")
        };
        line.append(
            format!("ms.{cell}r{octant}.{beam}"),
            Element::new(ElementKind::Sextupole, SEXT_LENGTH)
                .with_k_ref(polarity * 0.06)
                .with_knob(sext_knob),
        )?;
        drift(line, octant, beam, cell, 2)?;
        line.append(
            format!("mb.b{cell}r{octant}.{beam}"),
            Element::new(ElementKind::Bend, BEND_LENGTH).with_k_ref(bend_k0),
        )?;
        let oct_knob = if focusing {
            format!("kof.{arc}{beam}")
        } else {
            format!("kod.{arc}{beam}")
        };
        line.append(
            format!("mo.{cell}r{octant}.{beam}"),
            Element::new(ElementKind::Octupole, OCT_LENGTH)
                .with_k_ref(polarity * 0.1)
                .with_knob(oct_knob),
        )?;
        drift(line, octant, beam, cell, 3)?;
    }

    // Per-octant specials: skew sextupole, spool-piece correctors and the
    // odd unplugged magnet left in the sequence as a drift.
    line.append(
        format!("mss.3r{octant}.{beam}"),
        Element::new(ElementKind::Sextupole, SEXT_LENGTH).with_k_ref_skew(0.04),
    )?;
    if octant == 5 {
        line.append(
            format!("mcs.3r{octant}.{beam}"),
            Element::new(ElementKind::Drift, 0.11),
        )?;
    } else {
        line.append(
            format!("mcs.3r{octant}.{beam}"),
            Element::new(ElementKind::Multipole, 0.11).with_knl(vec![0.0, 0.0, 0.09]),
        )?;
    }
    line.append(
        format!("mcd.2r{octant}.{beam}"),
        Element::new(ElementKind::Multipole, 0.11).with_knl(vec![0.0, 0.0, 0.0, 0.0, 5.0e-2]),
    )?;
    if octant == 1 || octant == 5 {
        line.append(
            format!("mctx.3r{octant}.{beam}"),
            Element::new(ElementKind::Multipole, 0.43)
                .with_knl(vec![0.0, 0.0, 0.0, 0.0, 0.0, 2.0e-2]),
        )?;
    }
    if octant == 4 {
        line.append(
            format!("bpmwb.4r{octant}.{beam}"),
            Element::new(ElementKind::Monitor, 0.0),
        )?;
        line.append(
            format!("acsca.d4r{octant}.{beam}"),
            Element::new(ElementKind::Cavity, 3.0),
        )?;
    }
    if octant == 7 {
        line.append(
            format!("tcp.c6r{octant}.{beam}"),
            Element::new(ElementKind::Limit, 0.6),
        )?;
    }
    Ok(())
}

fn drift(line: &mut Line, octant: u32, beam: &str, cell: u32, slot: u32) -> Result<(), Fault> {
    line.append(
        format!("drift.{cell}{slot}r{octant}.{beam}"),
        Element::new(ElementKind::Drift, CELL_DRIFT),
    )
}

/// Arc label for the octant downstream of an interaction point, in the
/// `a{from}{to}` powering convention (`a12` … `a81`).
pub fn arc_label(octant: u32) -> String {
    format!("a{octant}{}", octant % 8 + 1)
}

fn install_demo_vars(model: &mut LatticeModel) -> Result<(), Fault> {
    model.vars.set("nrj", 6800.0);
    model.vars.set("kmax_mo", 0.038);
    model.vars.set("imax_mo", 550.0);
    for beam in ["b1", "b2"] {
        model.vars.set(format!("kqtf.{beam}"), 0.0);
        model.vars.set(format!("kqtd.{beam}"), 0.0);
        model.vars.set(format!("ksf.{beam}"), 0.0);
        model.vars.set(format!("ksd.{beam}"), 0.0);
        model.vars.set(format!("cmrs.{beam}"), 0.0);
        model.vars.set(format!("cmis.{beam}"), 0.0);
        // Arc-level powering: trim quads hang off the per-beam tune trims,
        // octupole circuits stay at zero until a current knob is installed.
        for octant in DEMO_OCTANTS {
            let arc = arc_label(octant);
            model.vars.set_expr(
                format!("kqtf.{arc}{beam}"),
                Expr::var(format!("kqtf.{beam}")),
            )?;
            model.vars.set_expr(
                format!("kqtd.{arc}{beam}"),
                Expr::var(format!("kqtd.{beam}")),
            )?;
            model.vars.set(format!("kof.{arc}{beam}"), 0.0);
            model.vars.set(format!("kod.{arc}{beam}"), 0.0);
        }
    }
    for octant in DEMO_OCTANTS {
        model.vars.set(format!("on_x{octant}"), 0.0);
        model.vars.set(format!("on_sep{octant}"), 0.0);
    }
    model.vars.set("on_alice", 0.0);
    model.vars.set("on_lhcb", 0.0);
    model.vars.set("on_disp", 0.0);
    for beam in ["b1", "b2"] {
        for octant in DEMO_OCTANTS {
            for cell in DEMO_CELLS {
                let focusing = cell % 2 == 0;
                let plane = if focusing { "h" } else { "v" };
                model
                    .vars
                    .set(format!("acb{plane}.{cell}r{octant}.{beam}"), 0.0);
            }
        }
        // Crossing bumps drive the cell-2 kickers around the low-beta
        // insertions, which removes them from free steering.
        for octant in DEMO_CROSSING_OCTANTS {
            model.vars.set_expr(
                format!("acbh.2r{octant}.{beam}"),
                Expr::var(format!("on_x{octant}")).mul(Expr::number(1.0e-6)),
            )?;
        }
    }
    Ok(())
}
