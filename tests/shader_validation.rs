//! Every generated WGSL program must parse and validate with naga.

use drape::grid::Neighborhood;
use drape::shader::{mass_spring_kernel, pbd_kernel, render_shader, CONSTRAIN_ENTRY, INTEGRATE_ENTRY};
use drape::strategy::StrategyKind;

fn validate_wgsl(code: &str) -> Result<naga::Module, String> {
    let module = naga::front::wgsl::parse_str(code).map_err(|e| format!("WGSL parse error: {:?}", e))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| format!("WGSL validation error: {:?}", e))?;

    Ok(module)
}

fn entry_points(module: &naga::Module) -> Vec<(String, naga::ShaderStage)> {
    module
        .entry_points
        .iter()
        .map(|ep| (ep.name.clone(), ep.stage))
        .collect()
}

fn compute_entry(module: &naga::Module, name: &str) -> Option<[u32; 3]> {
    module
        .entry_points
        .iter()
        .find(|ep| ep.name == name && ep.stage == naga::ShaderStage::Compute)
        .map(|ep| ep.workgroup_size)
}

#[test]
fn test_pbd_kernel_validates() {
    let module = validate_wgsl(&pbd_kernel()).expect("PBD kernel should be valid");
    assert_eq!(compute_entry(&module, INTEGRATE_ENTRY), Some([64, 1, 1]));
    assert_eq!(compute_entry(&module, CONSTRAIN_ENTRY), None);
}

#[test]
fn test_mass_spring_kernels_validate() {
    for neighborhood in [Neighborhood::Structural, Neighborhood::Shear] {
        let module = validate_wgsl(&mass_spring_kernel(neighborhood))
            .unwrap_or_else(|e| panic!("{:?} mass-spring kernel invalid: {}", neighborhood, e));
        assert_eq!(compute_entry(&module, INTEGRATE_ENTRY), Some([64, 1, 1]));
        assert_eq!(compute_entry(&module, CONSTRAIN_ENTRY), Some([64, 1, 1]));
    }
}

#[test]
fn test_default_sources_match_strategies() {
    for kind in StrategyKind::ALL {
        let module = validate_wgsl(&kind.default_source(Neighborhood::Shear))
            .unwrap_or_else(|e| panic!("{} kernel invalid: {}", kind, e));
        assert_eq!(
            compute_entry(&module, CONSTRAIN_ENTRY).is_some(),
            kind.relaxes_constraints()
        );
    }
}

#[test]
fn test_kernels_share_binding_contract() {
    for source in [pbd_kernel(), mass_spring_kernel(Neighborhood::Shear)] {
        let module = validate_wgsl(&source).expect("kernel should be valid");
        let mut bindings: Vec<(u32, naga::AddressSpace)> = module
            .global_variables
            .iter()
            .filter_map(|(_, var)| var.binding.as_ref().map(|b| (b.binding, var.space)))
            .collect();
        bindings.sort_by_key(|(binding, _)| *binding);

        assert_eq!(bindings.len(), 3);
        assert_eq!(bindings[0], (0, naga::AddressSpace::Uniform));
        assert_eq!(
            bindings[1],
            (1, naga::AddressSpace::Storage { access: naga::StorageAccess::LOAD })
        );
        assert_eq!(
            bindings[2],
            (
                2,
                naga::AddressSpace::Storage {
                    access: naga::StorageAccess::LOAD | naga::StorageAccess::STORE
                }
            )
        );
    }
}

#[test]
fn test_render_shader_validates() {
    let module = validate_wgsl(&render_shader()).expect("render shader should be valid");
    let entries = entry_points(&module);
    assert!(entries.contains(&("vs_main".to_string(), naga::ShaderStage::Vertex)));
    assert!(entries.contains(&("fs_main".to_string(), naga::ShaderStage::Fragment)));
}
