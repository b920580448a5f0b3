pub(crate) const DOMAIN_HEAD: &str = r###"<domain type='kvm'>
  <name>{{NAME}}</name>
  <uuid>{{UUID}}</uuid>
  <memory unit='KiB'>{{MEMORY}}</memory>
  <currentMemory unit='KiB'>{{MEMORY}}</currentMemory>
  <vcpu placement='static'>{{VCPU}}</vcpu>
  <resource>
    <partition>/machine</partition>
  </resource>
  <os>
    <type arch='x86_64' machine='pc-i440fx-rhel7.0.0'>hvm</type>
    <boot dev='{{BOOT}}'/>
  </os>
  <features>
    <acpi/>
    <apic/>
    <pae/>
  </features>
  <cpu mode='host-passthrough' check='none'/>
  <clock offset='localtime'/>
  <on_poweroff>destroy</on_poweroff>
  <on_reboot>restart</on_reboot>
  <on_crash>destroy</on_crash>
  <devices>
    <emulator>/usr/libexec/qemu-kvm</emulator>
"###;

pub(crate) const DISK: &str = r###"    <disk type='file' device='disk'>
      <driver name='qemu' type='qcow2'/>
      <source file='{{DISK}}'/>
      <backingStore/>
      <target dev='hda' bus='ide'/>
      <alias name='ide0-0-0'/>
      <address type='drive' controller='0' bus='0' target='0' unit='0'/>
    </disk>
"###;

pub(crate) const CDROM: &str = r###"    <disk type='file' device='cdrom'>
      <driver name='qemu' type='raw'/>
      <source file='{{ISO}}'/>
      <backingStore/>
      <target dev='hdb' bus='ide'/>
      <readonly/>
      <alias name='ide0-0-1'/>
      <address type='drive' controller='0' bus='0' target='0' unit='1'/>
    </disk>
"###;

pub(crate) const INTERFACE_HEAD: &str = r###"    <controller type='usb' index='0' model='piix3-uhci'>
      <alias name='usb'/>
      <address type='pci' domain='0x0000' bus='0x00' slot='0x01' function='0x2'/>
    </controller>
    <controller type='pci' index='0' model='pci-root'>
      <alias name='pci.0'/>
    </controller>
    <controller type='ide' index='0'>
      <alias name='ide'/>
      <address type='pci' domain='0x0000' bus='0x00' slot='0x01' function='0x1'/>
    </controller>
    <interface type='{{NETWORK_TYPE}}'>
      <mac address='{{MAC}}'/>
      <source {{SOURCE_ATTR}}='{{NETWORK_NAME}}'{{BRIDGE}}/>
"###;

pub(crate) const BANDWIDTH: &str = r###"      <bandwidth>
        <inbound average='{{INBOUND}}'/>
        <outbound average='{{OUTBOUND}}'/>
      </bandwidth>
"###;

pub(crate) const DOMAIN_TAIL: &str = r###"      <target dev='vnet0'/>
      <model type='virtio'/>
      <alias name='net0'/>
      <address type='pci' domain='0x0000' bus='0x00' slot='0x03' function='0x0'/>
    </interface>
    <input type='mouse' bus='ps2'>
      <alias name='input0'/>
    </input>
    <input type='keyboard' bus='ps2'>
      <alias name='input1'/>
    </input>
    <graphics type='vnc' port='{{VNC_PORT}}' autoport='yes' listen='0.0.0.0' keymap='en-us'>
      <listen type='address' address='0.0.0.0'/>
    </graphics>
    <video>
      <model type='cirrus' vram='16384' heads='1' primary='yes'/>
      <alias name='video0'/>
      <address type='pci' domain='0x0000' bus='0x00' slot='0x02' function='0x0'/>
    </video>
    <memballoon model='virtio'>
      <alias name='balloon0'/>
      <address type='pci' domain='0x0000' bus='0x00' slot='0x04' function='0x0'/>
    </memballoon>
  </devices>
  <seclabel type='dynamic' model='dac' relabel='yes'>
    <label>+9869:+9869</label>
    <imagelabel>+9869:+9869</imagelabel>
  </seclabel>
</domain>
"###;
